//! MCP server management (spawn, communicate, lifecycle).

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsParams,
    ListToolsResult, RequestId, Tool,
};

/// Default timeout for MCP requests after the handshake.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on the initialize handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `shutdown` waits for the server to exit after stdin closes.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Maximum output size (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Interpreter used to run a server script, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Python,
    Node,
}

impl Interpreter {
    /// Pick the interpreter for a script path. Only `.py` and `.js` are known.
    pub fn for_script(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("py") => Some(Self::Python),
            Some("js") => Some(Self::Node),
            _ => None,
        }
    }

    pub fn program(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "node",
        }
    }
}

/// Configuration for an MCP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub handshake_timeout: Duration,
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Configuration running `command` with `args` and default timeouts.
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Configuration for a server script, run by the interpreter matching its
    /// extension. Fails before anything is spawned if the extension is unknown.
    pub fn for_script(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let interpreter = Interpreter::for_script(path).ok_or_else(|| Error::UnsupportedScript {
            path: path.to_path_buf(),
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "server".to_string());

        Ok(Self::new(
            name,
            interpreter.program(),
            [path.to_string_lossy().into_owned()],
        ))
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

type ResponseSender = oneshot::Sender<Result<JsonRpcResponse>>;

/// Request-id correlation table shared with the reader task.
///
/// Once the server's stdout closes the table is marked closed and dropping
/// the senders wakes every waiter.
#[derive(Default)]
struct Pending {
    waiters: HashMap<RequestId, ResponseSender>,
    closed: bool,
}

type SharedPending = Arc<Mutex<Pending>>;
type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

/// Handle to a running MCP server.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Child>,
    stdin: SharedStdin,
    pending: SharedPending,
    reader: JoinHandle<()>,
    in_flight: Mutex<()>,
    next_id: AtomicI64,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|source| Error::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = process.stdin.take().ok_or_else(|| Error::Spawn {
            command: config.command.clone(),
            source: std::io::Error::other("failed to capture stdin"),
        })?;

        let stdout = process.stdout.take().ok_or_else(|| Error::Spawn {
            command: config.command.clone(),
            source: std::io::Error::other("failed to capture stdout"),
        })?;

        info!(
            server = %config.name,
            command = %config.command,
            args = ?config.args,
            pid = ?process.id(),
            "spawned MCP server"
        );

        let stdin: SharedStdin = Arc::new(Mutex::new(Some(stdin)));
        let pending: SharedPending = Arc::default();
        let reader = tokio::spawn(read_loop(
            config.name.clone(),
            stdout,
            Arc::clone(&stdin),
            Arc::clone(&pending),
        ));

        Ok(Self {
            config,
            process: Mutex::new(process),
            stdin,
            pending,
            reader,
            in_flight: Mutex::new(()),
            next_id: AtomicI64::new(1),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        })
    }

    /// Spawn a server and complete the handshake. The process is torn down if
    /// the handshake fails.
    pub async fn connect(config: ServerConfig) -> Result<Self> {
        let server = Self::spawn(config).await?;
        if let Err(e) = server.initialize().await.map(|_| ()) {
            server.shutdown().await;
            return Err(e);
        }
        Ok(server)
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Initialize the server (must be called before other operations).
    pub async fn initialize(&self) -> Result<&Self> {
        let params = InitializeParams::default();
        let result: InitializeResult = self
            .request("initialize", Some(params), self.config.handshake_timeout)
            .await?;

        info!(
            server = %self.config.name,
            protocol = %result.protocol_version,
            remote = %result.server_info.name,
            "handshake complete"
        );

        self.notify("notifications/initialized").await?;
        *self.server_info.lock().await = Some(result);

        self.list_tools().await?;

        Ok(self)
    }

    /// Check if the server is initialized.
    pub async fn is_initialized(&self) -> bool {
        self.server_info.lock().await.is_some()
    }

    /// Get server info (after initialization).
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Fetch the tool catalog from the server, following pagination, and
    /// cache it.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.require_initialized().await?;

        let mut tools = Vec::new();
        let mut cursor = None;
        let mut seen = HashSet::new();
        loop {
            let params = ListToolsParams { cursor };
            let page: ListToolsResult = self
                .request("tools/list", Some(params), self.config.request_timeout)
                .await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(Error::InvalidResponse(format!(
                        "tools/list repeated cursor {next:?}"
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(server = %self.config.name, count = tools.len(), "fetched tool catalog");
        *self.tools.lock().await = tools.clone();
        Ok(tools)
    }

    /// Get the tool catalog from the last fetch.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.require_initialized().await?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        debug!(server = %self.config.name, tool = name, "calling tool");
        let result: CallToolResult = self
            .request("tools/call", Some(params), self.config.request_timeout)
            .await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.joined_text()));
        }

        Ok(result)
    }

    /// Process id of the server, if it has not been reaped yet.
    pub async fn id(&self) -> Option<u32> {
        self.process.lock().await.id()
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Shut down the server: close its stdin, give it a grace period to exit,
    /// then kill it. The process is always reaped.
    pub async fn shutdown(self) {
        // Dropping stdin closes the pipe; stdio servers exit on EOF.
        self.stdin.lock().await.take();

        let mut process = self.process.into_inner();
        match timeout(SHUTDOWN_GRACE, process.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.config.name, %status, "server exited");
            }
            Ok(Err(e)) => {
                warn!(server = %self.config.name, "failed to wait for server: {e}");
                let _ = process.kill().await;
            }
            Err(_) => {
                debug!(server = %self.config.name, "server did not exit, killing");
                if let Err(e) = process.kill().await {
                    warn!(server = %self.config.name, "failed to kill server: {e}");
                }
            }
        }

        self.reader.abort();
        info!(server = %self.config.name, "server shut down");
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn require_initialized(&self) -> Result<()> {
        if self.is_initialized().await {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>, wait: Duration) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let _in_flight = self.in_flight.lock().await;

        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(Error::ServerExited);
            }
            pending.waiters.insert(id.clone(), tx);
        }

        if let Err(e) = write_message(&self.stdin, &request).await {
            self.pending.lock().await.waiters.remove(&id);
            return Err(e);
        }

        let response = match timeout(wait, rx).await {
            Ok(Ok(response)) => response?,
            Ok(Err(_)) => return Err(Error::ServerExited),
            Err(_) => {
                self.pending.lock().await.waiters.remove(&id);
                return Err(Error::Timeout(wait));
            }
        };

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        write_message(&self.stdin, &JsonRpcNotification::new(method)).await
    }
}

async fn write_message(stdin: &SharedStdin, message: &impl serde::Serialize) -> Result<()> {
    let json = serde_json::to_string(message)?;
    let mut stdin = stdin.lock().await;
    let stdin = stdin.as_mut().ok_or(Error::ServerExited)?;
    stdin.write_all(json.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

/// One newline-terminated frame read from the server.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// The line is in the buffer, newline included.
    Line,
    /// The line exceeded the size limit and was discarded.
    Oversized(usize),
}

/// Read one line into `buf`, keeping at most `max` bytes of content. Returns
/// `None` at EOF.
async fn read_frame<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut size = 0;
    let mut oversized = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }

        let (take, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        size += take;

        if !oversized && buf.len() + take > max + 1 {
            oversized = true;
            buf.clear();
        }
        if !oversized {
            buf.extend_from_slice(&available[..take]);
        }
        reader.consume(take);

        if done {
            break;
        }
    }

    Ok(match size {
        0 => None,
        _ if oversized => Some(Frame::Oversized(size)),
        _ => Some(Frame::Line),
    })
}

/// Reads server stdout until EOF, routing responses to their waiters.
///
/// Lines that are not JSON-RPC messages, including invalid UTF-8, are logged
/// and skipped. A line over [`MAX_OUTPUT_SIZE`] fails the outstanding request.
async fn read_loop(
    server: String,
    stdout: ChildStdout,
    stdin: SharedStdin,
    pending: SharedPending,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        match read_frame(&mut reader, &mut buf, MAX_OUTPUT_SIZE).await {
            Ok(Some(Frame::Line)) => {}
            Ok(Some(Frame::Oversized(size))) => {
                warn!(%server, size, "discarding oversized line from server");
                let waiters: Vec<_> = pending.lock().await.waiters.drain().collect();
                for (_, waiter) in waiters {
                    let _ = waiter.send(Err(Error::OutputTooLarge {
                        size,
                        max: MAX_OUTPUT_SIZE,
                    }));
                }
                continue;
            }
            Ok(None) => break,
            Err(e) => {
                warn!(%server, "failed to read from server: {e}");
                break;
            }
        }

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let message: JsonRpcMessage = match serde_json::from_slice(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(%server, "ignoring unparseable line from server: {e}");
                continue;
            }
        };

        match message {
            JsonRpcMessage::Response(response) => {
                let Some(waiter) = pending.lock().await.waiters.remove(&response.id) else {
                    warn!(%server, id = %response.id, "response for unknown request");
                    continue;
                };
                // The caller may have timed out already.
                let _ = waiter.send(Ok(response));
            }
            JsonRpcMessage::Notification(notification) => {
                debug!(%server, method = %notification.method, "server notification");
            }
            JsonRpcMessage::Request(request) => {
                let reply = match request.method.as_str() {
                    "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),
                    method => JsonRpcResponse::failure(
                        request.id,
                        JsonRpcError::method_not_found(method),
                    ),
                };
                if let Err(e) = write_message(&stdin, &reply).await {
                    warn!(%server, "failed to answer server request: {e}");
                }
            }
        }
    }

    let mut pending = pending.lock().await;
    pending.closed = true;
    pending.waiters.clear();
    debug!(%server, "server stdout closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_creation() {
        let config = ServerConfig::new("test", "echo", ["hello"]);
        assert_eq!(config.name, "test");
        assert_eq!(config.args, vec!["hello".to_string()]);
        assert_eq!(config.request_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn script_interpreter_by_extension() {
        let py = ServerConfig::for_script("servers/weather.py").unwrap();
        assert_eq!(py.command, "python");
        assert_eq!(py.args, vec!["servers/weather.py".to_string()]);
        assert_eq!(py.name, "weather");

        let js = ServerConfig::for_script("build/index.js").unwrap();
        assert_eq!(js.command, "node");
    }

    #[test]
    fn unsupported_script_is_rejected() {
        for path in ["server.rb", "server", "server.py.txt", "server.PY"] {
            let err = ServerConfig::for_script(path).unwrap_err();
            assert!(matches!(err, Error::UnsupportedScript { .. }), "{path}");
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let config = ServerConfig::new("missing", "definitely-not-a-real-binary-4a1f", Vec::<String>::new());
        let err = Server::spawn(config).await.err().unwrap();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn server_exiting_immediately_fails_handshake() {
        let config = ServerConfig::new("true", "true", Vec::<String>::new());
        let err = Server::connect(config).await.err().unwrap();
        assert!(
            matches!(err, Error::ServerExited | Error::Io(_)),
            "unexpected error: {err}"
        );
    }

    const INIT_REPLY: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"scripted"}}}"#;

    /// A shell provider that answers the handshake, then runs `rest`.
    /// `before` runs before anything is read from stdin.
    fn scripted_server(before: &str, rest: &str) -> ServerConfig {
        let script = format!(
            "{before}\nread -r _; printf '%s\\n' '{INIT_REPLY}'\nread -r _\n{rest}"
        );
        ServerConfig::new("scripted", "sh", ["-c".to_string(), script])
            .with_handshake_timeout(Duration::from_secs(5))
            .with_request_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn read_frame_bounds_line_length() {
        let mut input: &[u8] = b"short\n0123456789\ntail";
        let mut buf = Vec::new();

        assert_eq!(read_frame(&mut input, &mut buf, 8).await.unwrap(), Some(Frame::Line));
        assert_eq!(buf, b"short\n");
        assert_eq!(
            read_frame(&mut input, &mut buf, 8).await.unwrap(),
            Some(Frame::Oversized(11))
        );
        assert!(buf.is_empty());
        assert_eq!(read_frame(&mut input, &mut buf, 8).await.unwrap(), Some(Frame::Line));
        assert_eq!(buf, b"tail");
        assert_eq!(read_frame(&mut input, &mut buf, 8).await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_lines_are_skipped() {
        let config = scripted_server(
            r"printf '\377\376 garbage\n'",
            r#"read -r _; printf '\377\n%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","inputSchema":{"type":"object"}}]}}'
cat > /dev/null"#,
        );

        let server = Server::connect(config).await.unwrap();
        let names: Vec<_> = server.tools().await.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo"]);
        assert!(server.is_running().await);
        server.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn oversized_response_fails_the_call() {
        let config = scripted_server(
            "",
            r#"read -r _; printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}'
read -r _; head -c 1100000 /dev/zero | tr '\0' 'a'; echo
cat > /dev/null"#,
        );

        let server = Server::connect(config).await.unwrap();
        let err = server.call_tool("big", None).await.unwrap_err();
        assert!(
            matches!(err, Error::OutputTooLarge { max: MAX_OUTPUT_SIZE, .. }),
            "unexpected error: {err}"
        );
        assert!(server.is_running().await);
        server.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn repeated_list_cursor_is_rejected() {
        let config = scripted_server(
            "",
            r#"i=2
while read -r _; do
  printf '{"jsonrpc":"2.0","id":%d,"result":{"tools":[],"nextCursor":"again"}}\n' "$i"
  i=$((i + 1))
done"#,
        );

        let err = Server::connect(config).await.err().unwrap();
        assert!(matches!(err, Error::InvalidResponse(_)), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_server_times_out_handshake() {
        let config = ServerConfig::new("sleep", "sleep", ["30"])
            .with_handshake_timeout(Duration::from_millis(200));
        let err = Server::connect(config).await.err().unwrap();
        assert!(matches!(err, Error::Timeout(_)), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn calls_before_handshake_are_rejected() {
        let config = ServerConfig::new("sleep", "sleep", ["30"]);
        let server = Server::spawn(config).await.unwrap();
        assert!(matches!(
            server.call_tool("anything", None).await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(server.list_tools().await, Err(Error::NotInitialized)));
        server.shutdown().await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn shutdown_reaps_unresponsive_server() {
        let config = ServerConfig::new("sleep", "sleep", ["30"]);
        let server = Server::spawn(config).await.unwrap();
        let pid = server.id().await.unwrap();
        assert!(server.is_running().await);

        server.shutdown().await;
        assert!(!Path::new(&format!("/proc/{pid}")).exists());
    }
}
