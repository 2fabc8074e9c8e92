use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::PlayerConfig;
use crate::error::PlayerError;

/// The playback engine as seen by the control loop.
pub trait Player {
    /// Volume as a 0-100 percentage. Called on every tick, so it must be cheap
    /// when the value has not changed.
    fn set_volume(&mut self, percentage: f64) -> Result<(), PlayerError>;

    fn play_stream(&mut self, url: &str) -> Result<(), PlayerError>;

    /// Play a local file. A missing file is logged and skipped.
    fn play_local(&mut self, path: &Path, looped: bool) -> Result<(), PlayerError>;

    fn stop(&mut self) -> Result<(), PlayerError>;

    fn is_playing(&mut self) -> bool;

    /// Stream URL or file path of the last play command, until `stop`.
    fn current_source(&self) -> Option<&str>;

    /// Title of what is playing as reported by the source, e.g. the ICY
    /// title of an internet stream.
    fn track_title(&mut self) -> Option<String> {
        None
    }
}

/// Player volume is an integer percentage.
pub fn volume_level(percentage: f64) -> u8 {
    percentage.clamp(0.0, 100.0) as u8
}

#[derive(Serialize)]
struct IpcCommand<'a> {
    command: (&'a str, &'a str, u8),
}

const TITLE_REQUEST_ID: u32 = 1;
// How long a fetched title is reused before asking mpv again
const TITLE_REFRESH: Duration = Duration::from_secs(2);
const IPC_READ_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct IpcRequest<'a> {
    command: (&'a str, &'a str),
    request_id: u32,
}

#[derive(Debug, Deserialize)]
struct IpcReply {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    request_id: Option<u32>,
}

/// Picks the answer to `request_id` out of one line of mpv IPC output.
/// `None` when the line is an event or another reply.
fn reply_title(line: &str, request_id: u32) -> Option<Option<String>> {
    let reply: IpcReply = serde_json::from_str(line).ok()?;
    if reply.request_id != Some(request_id) {
        return None;
    }
    if reply.error.as_deref() != Some("success") {
        return Some(None);
    }
    Some(reply.data.and_then(|d| d.as_str().map(str::to_string)).filter(|t| !t.is_empty()))
}

/// Plays through an `mpv` child process, one process per source. Volume
/// changes go over mpv's JSON IPC socket.
pub struct MpvPlayer {
    program: String,
    ipc_socket: PathBuf,
    child: Option<Child>,
    source: Option<String>,
    volume: u8,
    volume_synced: bool,
    title: Option<String>,
    title_checked: Option<Instant>,
}

impl MpvPlayer {
    pub fn new(config: &PlayerConfig) -> Self {
        MpvPlayer {
            program: config.program.clone(),
            ipc_socket: config.ipc_socket.clone(),
            child: None,
            source: None,
            volume: 100,
            volume_synced: false,
            title: None,
            title_checked: None,
        }
    }

    fn spawn(&mut self, source: &str, looped: bool) -> Result<(), PlayerError> {
        self.kill_child()?;
        // a stale socket from a previous run would accept nothing
        let _ = fs::remove_file(&self.ipc_socket);

        let mut command = Command::new(&self.program);
        command
            .arg("--no-video")
            .arg("--really-quiet")
            .arg(format!("--input-ipc-server={}", self.ipc_socket.display()))
            .arg(format!("--volume={}", self.volume));
        if looped {
            command.arg("--loop-file=inf");
        }
        command.arg(source).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let child = command.spawn().map_err(PlayerError::Spawn)?;
        tracing::debug!("Started {} (pid {}) for {}", self.program, child.id(), source);
        self.child = Some(child);
        self.source = Some(source.to_string());
        self.volume_synced = true;
        self.title = None;
        self.title_checked = None;
        Ok(())
    }

    fn kill_child(&mut self) -> Result<(), PlayerError> {
        if let Some(mut child) = self.child.take() {
            match child.kill() {
                Ok(()) => {}
                // already exited
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                Err(e) => return Err(PlayerError::Kill(e)),
            }
            child.wait().map_err(PlayerError::Kill)?;
        }
        Ok(())
    }

    fn send_volume(&mut self) -> Result<(), PlayerError> {
        let mut stream = match UnixStream::connect(&self.ipc_socket) {
            Ok(stream) => stream,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused) => {
                // mpv has not opened its socket yet, retry on the next tick
                tracing::debug!("Player IPC not ready: {}", e);
                return Ok(());
            }
            Err(e) => return Err(PlayerError::Ipc(e)),
        };

        let mut line = serde_json::to_vec(&IpcCommand {
            command: ("set_property", "volume", self.volume),
        })?;
        line.push(b'\n');
        stream.write_all(&line).map_err(PlayerError::Ipc)?;
        self.volume_synced = true;
        Ok(())
    }

    /// Ask mpv for `media-title`. `Ok(None)` while the socket is not up yet.
    fn query_title(&self) -> Result<Option<String>, PlayerError> {
        let mut stream = match UnixStream::connect(&self.ipc_socket) {
            Ok(stream) => stream,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused) => {
                return Ok(None);
            }
            Err(e) => return Err(PlayerError::Ipc(e)),
        };
        stream.set_read_timeout(Some(IPC_READ_TIMEOUT)).map_err(PlayerError::Ipc)?;

        let mut line = serde_json::to_vec(&IpcRequest {
            command: ("get_property", "media-title"),
            request_id: TITLE_REQUEST_ID,
        })?;
        line.push(b'\n');
        stream.write_all(&line).map_err(PlayerError::Ipc)?;

        for reply in BufReader::new(stream).lines() {
            let reply = reply.map_err(PlayerError::Ipc)?;
            if let Some(title) = reply_title(&reply, TITLE_REQUEST_ID) {
                return Ok(title);
            }
        }
        Ok(None)
    }

    fn already_playing(&mut self, source: &str) -> bool {
        self.source.as_deref() == Some(source) && self.is_playing()
    }
}

impl Player for MpvPlayer {
    fn set_volume(&mut self, percentage: f64) -> Result<(), PlayerError> {
        let level = volume_level(percentage);
        if level == self.volume && self.volume_synced {
            return Ok(());
        }
        if level != self.volume {
            self.volume = level;
            self.volume_synced = false;
        }
        if self.is_playing() {
            self.send_volume()?;
        }
        Ok(())
    }

    fn play_stream(&mut self, url: &str) -> Result<(), PlayerError> {
        if self.already_playing(url) {
            return Ok(());
        }
        self.spawn(url, false)
    }

    fn play_local(&mut self, path: &Path, looped: bool) -> Result<(), PlayerError> {
        if !path.exists() {
            tracing::warn!("Local audio file not found: {}", path.display());
            return Ok(());
        }
        let source = path.to_string_lossy().into_owned();
        if self.already_playing(&source) {
            return Ok(());
        }
        self.spawn(&source, looped)
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.kill_child()?;
        self.source = None;
        self.title = None;
        Ok(())
    }

    /// True while the child process is alive. Reaps it once it has exited.
    fn is_playing(&mut self) -> bool {
        match self.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                tracing::debug!("Player exited with {}", status);
                self.child = None;
                false
            }
            Some(Err(e)) => {
                tracing::warn!("Cannot poll player process: {}", e);
                false
            }
            None => false,
        }
    }

    fn current_source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn track_title(&mut self) -> Option<String> {
        if !self.is_playing() {
            self.title = None;
            return None;
        }
        if self.title_checked.is_some_and(|at| at.elapsed() < TITLE_REFRESH) {
            return self.title.clone();
        }

        self.title_checked = Some(Instant::now());
        match self.query_title() {
            Ok(title) => self.title = title,
            Err(e) => tracing::debug!("Cannot read track title: {}", e),
        }
        self.title.clone()
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        if let Err(e) = self.kill_child() {
            tracing::warn!("Failed to stop player on exit: {}", e);
        }
        let _ = fs::remove_file(&self.ipc_socket);
    }
}

/// Plays nothing, only logs what it would do. Used with the simulated panel.
#[derive(Debug, Default)]
pub struct LogPlayer {
    volume: u8,
    source: Option<String>,
    playing: bool,
}

impl LogPlayer {
    pub fn new() -> Self {
        LogPlayer { volume: 50, ..LogPlayer::default() }
    }
}

impl Player for LogPlayer {
    fn set_volume(&mut self, percentage: f64) -> Result<(), PlayerError> {
        let level = volume_level(percentage);
        if level != self.volume {
            tracing::debug!("Mock: volume {}", level);
            self.volume = level;
        }
        Ok(())
    }

    fn play_stream(&mut self, url: &str) -> Result<(), PlayerError> {
        if self.playing && self.source.as_deref() == Some(url) {
            return Ok(());
        }
        tracing::info!("Mock: now playing stream {}", url);
        self.source = Some(url.to_string());
        self.playing = true;
        Ok(())
    }

    fn play_local(&mut self, path: &Path, looped: bool) -> Result<(), PlayerError> {
        let source = path.to_string_lossy().into_owned();
        if self.playing && self.source.as_deref() == Some(source.as_str()) {
            return Ok(());
        }
        tracing::info!("Mock: now playing local file {}{}", source, if looped { " (looping)" } else { "" });
        self.source = Some(source);
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        if self.playing {
            tracing::info!("Mock: audio stopped");
        }
        self.playing = false;
        self.source = None;
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        self.playing
    }

    fn current_source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}
