//! Minimal HTTP/1.1 JSON surface for launching and polling tasks.

use crate::config::ConfigManager;
use crate::error::{Result, UglError};
use crate::service::Launcher;
use crate::tasks::TaskManager;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_HEADER_BYTES: usize = 1024 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
struct IncomingRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

/// Shared by every connection thread.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ConfigManager,
    pub tasks: TaskManager,
}

impl AppState {
    pub fn new(config: ConfigManager) -> Self {
        Self {
            config,
            tasks: TaskManager::new(),
        }
    }

    fn launcher(&self) -> Result<Launcher> {
        Launcher::new(self.config.load())
    }
}

pub fn serve(bind: &str, config: ConfigManager) -> Result<()> {
    let listener = TcpListener::bind(bind)?;
    let local = listener.local_addr()?;
    info!(address = %local, "http surface listening");
    eprintln!("Listening on http://{local}");
    let state = AppState::new(config);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = state.clone();
                thread::spawn(move || {
                    if let Err(err) = handle_tcp(stream, &state) {
                        warn!(error = %err, "connection failed");
                    }
                });
            }
            Err(err) => warn!(error = %err, "accept failed"),
        }
    }
    Ok(())
}

fn handle_tcp(mut stream: TcpStream, state: &AppState) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    handle_connection(&mut stream, state)
}

/// Reads one request from `stream`, routes it and writes the response.
pub fn handle_connection<S: Read + Write>(stream: &mut S, state: &AppState) -> Result<()> {
    let Some(request) = read_http_request(stream)? else {
        return Ok(());
    };
    debug!(method = %request.method, path = %request.path, "request");
    let (status, payload) = match route(&request, state) {
        Ok(response) => response,
        Err(err) => {
            warn!(path = %request.path, error = %err, "request failed");
            (500, json!({ "error": err.to_string() }))
        }
    };
    write_json_response(stream, status, &payload)
}

fn route(request: &IncomingRequest, state: &AppState) -> Result<(u16, Value)> {
    let method = request.method.as_str();
    let path = request.path.as_str();
    match (method, path) {
        ("GET", "/v1/healthz") => Ok((200, json!({ "ok": true, "ts": Utc::now().to_rfc3339() }))),
        ("GET", "/v1/environments") => {
            let environments = state.launcher()?.list_environments()?;
            Ok((200, json!({ "environments": environments })))
        }
        ("GET", "/v1/tasks") => Ok((200, json!({ "tasks": state.tasks.list_tasks()? }))),
        ("POST", "/v1/launch") => {
            let body = parse_body(&request.body);
            let environment = body_text(&body, "environment");
            let command = body_text(&body, "command");
            if environment.is_empty() || command.is_empty() {
                return Ok((
                    400,
                    json!({ "error": "environment and command are required" }),
                ));
            }
            let task = state.tasks.start(state.launcher()?, &environment, &command)?;
            Ok((200, serde_json::to_value(task)?))
        }
        ("GET", "/v1/config") => Ok((200, config_payload(state, state.config.load()))),
        ("POST", "/v1/config") => {
            let Value::Object(map) = parse_body(&request.body) else {
                return Ok((400, json!({ "error": "expected a JSON object" })));
            };
            let updates: BTreeMap<String, String> = map
                .into_iter()
                .map(|(key, value)| {
                    let text = match value {
                        Value::String(text) => text,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (key, text)
                })
                .collect();
            match state.config.update_overrides(&updates) {
                Ok(config) => Ok((200, config_payload(state, config))),
                Err(UglError::Config(message)) => Ok((400, json!({ "error": message }))),
                Err(err) => Err(err),
            }
        }
        ("GET", _) if path.starts_with("/v1/tasks/") => {
            let id = &path["/v1/tasks/".len()..];
            match state.tasks.get(id)? {
                Some(task) => Ok((200, serde_json::to_value(task)?)),
                None => Ok((404, json!({ "error": "not found" }))),
            }
        }
        _ => Ok((404, json!({ "error": "not found" }))),
    }
}

fn config_payload(state: &AppState, config: crate::config::LauncherConfig) -> Value {
    json!({
        "config": config,
        "override_path": state.config.override_path(),
        "overrides": state.config.read_overrides(),
    })
}

fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

fn body_text(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

fn read_http_request<S: Read>(stream: &mut S) -> Result<Option<IncomingRequest>> {
    let mut buf = Vec::new();
    let mut header_end: Option<usize> = None;
    let mut chunk = [0u8; 1024];
    while header_end.is_none() {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            header_end = Some(pos);
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(UglError::Process("request headers too large".to_string()));
        }
    }
    let header_end = header_end
        .ok_or_else(|| UglError::Process("request missing header delimiter".to_string()))?;
    let header_text = String::from_utf8_lossy(&buf[..header_end]);
    let mut lines = header_text.lines();
    let request_line = lines
        .next()
        .ok_or_else(|| UglError::Process("request missing request line".to_string()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| UglError::Process("request missing method".to_string()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| UglError::Process("request missing target".to_string()))?;
    let path = target
        .split_once('?')
        .map_or(target, |(path, _)| path)
        .to_string();
    let mut headers = BTreeMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(UglError::Process(format!(
            "request body too large ({content_length} bytes)"
        )));
    }
    let body_start = header_end + 4;
    let body_end = body_start
        .checked_add(content_length)
        .ok_or_else(|| UglError::Process("request body length overflows".to_string()))?;
    while buf.len() < body_end {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
    }
    if buf.len() < body_end {
        return Err(UglError::Process(
            "request ended before full body was received".to_string(),
        ));
    }
    let body = buf[body_start..body_end].to_vec();
    Ok(Some(IncomingRequest {
        method,
        path,
        body,
    }))
}

fn write_json_response<S: Write>(stream: &mut S, status: u16, payload: &Value) -> Result<()> {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    };
    let body = serde_json::to_vec(payload)?;
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        status_text,
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&body)?;
    stream.flush()?;
    Ok(())
}
