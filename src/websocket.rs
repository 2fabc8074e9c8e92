use serde::{Deserialize, Serialize};
use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use tungstenite::{accept, Message};

use crate::error::StationError;
use crate::panel::PanelControls;
use crate::state::{RadioStatus, StatusBoard};
use crate::stations::{StationDirectory, StationManager, StationRange};

/// Messages a status client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Query,
    ListStations,
    AddStation {
        min: f64,
        max: f64,
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    UpdateStation {
        index: usize,
        min: f64,
        max: f64,
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    RemoveStation {
        index: usize,
    },
    MoveStation {
        from: usize,
        to: usize,
    },
    ReloadStations,
    SetPanel {
        power: Option<bool>,
        tuner: Option<f64>,
        volume: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Status(RadioStatus),
    /// The control loop has not completed a tick yet.
    Waiting,
    Stations { stations: Vec<StationRange> },
    Ok,
    Error { message: String },
}

/// Everything a client connection may touch. The player and the GPIO lines
/// stay with the control loop.
#[derive(Clone)]
pub struct FeedContext {
    pub status: StatusBoard,
    pub stations: Arc<StationManager>,
    pub controls: Option<PanelControls>,
}

pub fn handle_request(ctx: &FeedContext, text: &str) -> Reply {
    let request = match serde_json::from_str::<Request>(text) {
        Ok(request) => request,
        Err(e) => {
            return Reply::Error { message: format!("bad request: {}", e) };
        }
    };

    match request {
        Request::Query => match ctx.status.latest() {
            Some(status) => Reply::Status(status),
            None => Reply::Waiting,
        },
        Request::ListStations => Reply::Stations { stations: ctx.stations.list() },
        Request::AddStation { min, max, url, title } => {
            station_reply(ctx.stations.add(StationRange { min, max, url, title }))
        }
        Request::UpdateStation { index, min, max, url, title } => {
            station_reply(ctx.stations.update(index, StationRange { min, max, url, title }))
        }
        Request::RemoveStation { index } => station_reply(ctx.stations.remove(index)),
        Request::MoveStation { from, to } => station_reply(ctx.stations.move_station(from, to)),
        Request::ReloadStations => station_reply(ctx.stations.reload()),
        Request::SetPanel { power, tuner, volume } => {
            let Some(controls) = &ctx.controls else {
                return Reply::Error {
                    message: String::from("panel controls are only available with the simulated panel"),
                };
            };
            if let Some(power) = power {
                controls.set_power(power);
            }
            if let Some(tuner) = tuner {
                controls.set_tuner(tuner);
            }
            if let Some(volume) = volume {
                controls.set_volume(volume);
            }
            Reply::Ok
        }
    }
}

fn station_reply(result: Result<Arc<StationDirectory>, StationError>) -> Reply {
    match result {
        Ok(directory) => Reply::Stations { stations: directory.stations().to_vec() },
        Err(e) => {
            tracing::warn!("Station change rejected: {}", e);
            Reply::Error { message: e.to_string() }
        }
    }
}

/// Accept status clients on `bind`, one thread per client. Each client text
/// message gets exactly one JSON reply.
pub fn websocket_thread(bind: &str, ctx: FeedContext) -> io::Result<()> {
    let server = TcpListener::bind(bind)?;
    tracing::info!("WebSocket status feed listening on {}", bind);

    for stream in server.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Connection error: {}", e);
                continue;
            }
        };

        let ctx = ctx.clone();
        thread::spawn(move || {
            let mut websocket = match accept(stream) {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::warn!("WebSocket handshake error: {}", e);
                    return;
                }
            };

            tracing::info!("New WebSocket client connected");

            loop {
                let reply = match websocket.read() {
                    Ok(Message::Text(text)) => handle_request(&ctx, &text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                };

                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        if websocket.send(Message::Text(json)).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("JSON serialization error: {}", e),
                }
            }

            tracing::info!("WebSocket client disconnected");
        });
    }

    Ok(())
}
