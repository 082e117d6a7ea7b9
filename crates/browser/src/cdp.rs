//! Chrome DevTools Protocol client for a single target.
//!
//! Two background tasks share the socket: one drains the outgoing queue, the
//! other routes replies back to their callers by request id. Protocol events
//! are not needed by the bot and are dropped on the floor.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const OUTGOING_QUEUE: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct CdpClient {
    outgoing: mpsc::Sender<String>,
    waiters: Waiters,
    next_id: AtomicU64,
    /// Cleared by the reader once the socket is gone.
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

async fn write_loop(mut sink: SplitSink<Socket, Message>, mut outgoing: mpsc::Receiver<String>) {
    while let Some(text) = outgoing.recv().await {
        if let Err(e) = sink.send(Message::Text(text)).await {
            warn!(error = %e, "CDP socket write failed");
            break;
        }
    }
}

async fn read_loop(mut stream: SplitStream<Socket>, waiters: Waiters, open: Arc<AtomicBool>) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!("CDP socket closed by the browser");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "CDP socket read failed");
                break;
            }
        };
        let Ok(reply) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        // Events carry no id.
        let Some(id) = reply.get("id").and_then(Value::as_u64) else {
            continue;
        };
        if let Some(waiter) = waiters.lock().await.remove(&id) {
            let _ = waiter.send(reply);
        }
    }
    open.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every caller still waiting.
    waiters.lock().await.clear();
}

/// Split a command reply into its `result` or its protocol error.
pub fn decode_reply(reply: &Value) -> Result<Value, String> {
    if let Some(err) = reply.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(message);
    }
    Ok(reply.get("result").cloned().unwrap_or(Value::Null))
}

impl CdpClient {
    pub async fn connect(ws_url: &str) -> Result<Self, String> {
        let (socket, _) = connect_async(ws_url)
            .await
            .map_err(|e| format!("cannot open CDP socket {}: {}", ws_url, e))?;
        let (sink, stream) = socket.split();

        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE);
        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));
        let open = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(write_loop(sink, outgoing_rx));
        let reader = tokio::spawn(read_loop(stream, waiters.clone(), open.clone()));

        Ok(Self {
            outgoing,
            waiters,
            next_id: AtomicU64::new(1),
            open,
            reader,
            writer,
        })
    }

    /// False once the remote end closed the socket (tab closed, browser gone).
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, String> {
        if !self.is_open() {
            return Err(format!("CDP socket closed, cannot send {}", method));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);

        let request = json!({ "id": id, "method": method, "params": params });
        if self.outgoing.send(request.to_string()).await.is_err() {
            self.waiters.lock().await.remove(&id);
            return Err(format!("CDP writer stopped, cannot send {}", method));
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(reply)) => decode_reply(&reply),
            Ok(Err(_)) => Err(format!("CDP socket closed while waiting for {}", method)),
            Err(_) => {
                self.waiters.lock().await.remove(&id);
                Err(format!(
                    "{} got no reply within {}s",
                    method,
                    COMMAND_TIMEOUT.as_secs()
                ))
            }
        }
    }

    pub async fn enable_domain(&self, domain: &str) -> Result<(), String> {
        self.send_command(&format!("{}.enable", domain), json!({}))
            .await
            .map(|_| ())
    }

    /// `Page.navigate`, failing on a network-level error such as an unknown host.
    pub async fn navigate(&self, url: &str) -> Result<Value, String> {
        let result = self
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;
        match result.get("errorText").and_then(Value::as_str) {
            Some(err) => Err(format!("navigation to {} failed: {}", url, err)),
            None => Ok(result),
        }
    }

    /// `Runtime.evaluate` with promises awaited and the value returned by copy.
    pub async fn evaluate_js(&self, expression: &str) -> Result<Value, String> {
        self.runtime_evaluate(expression, false).await
    }

    /// Same as `evaluate_js`, flagged as a user gesture so fullscreen and media play are allowed.
    pub async fn evaluate_js_with_gesture(&self, expression: &str) -> Result<Value, String> {
        self.runtime_evaluate(expression, true).await
    }

    async fn runtime_evaluate(&self, expression: &str, user_gesture: bool) -> Result<Value, String> {
        self.send_command(
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": true,
                "userGesture": user_gesture,
            }),
        )
        .await
    }

    /// Evaluate and unwrap to the plain value; a thrown exception is an error.
    pub async fn evaluate_value(&self, expression: &str) -> Result<Value, String> {
        let result = self.evaluate_js(expression).await?;
        extract_value(result)
    }

    /// Insert text into the focused element as if typed (input events, no key events).
    pub async fn insert_text(&self, text: &str) -> Result<(), String> {
        self.send_command("Input.insertText", json!({ "text": text }))
            .await
            .map(|_| ())
    }

    /// Replace the top frame's document with `html`.
    pub async fn set_document_content(&self, html: &str) -> Result<(), String> {
        let tree = self.send_command("Page.getFrameTree", json!({})).await?;
        let frame_id = tree
            .pointer("/frameTree/frame/id")
            .and_then(Value::as_str)
            .ok_or_else(|| "frame tree has no top frame id".to_string())?
            .to_string();
        self.send_command(
            "Page.setDocumentContent",
            json!({ "frameId": frame_id, "html": html }),
        )
        .await
        .map(|_| ())
    }

    // ─── Targets ──────────────────────────────────────────────────────

    /// Open a new tab at `url`; returns its target id.
    pub async fn create_target(&self, url: &str) -> Result<String, String> {
        let result = self
            .send_command("Target.createTarget", json!({ "url": url }))
            .await?;
        result
            .get("targetId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| "Target.createTarget returned no targetId".to_string())
    }

    pub async fn close_target(&self, target_id: &str) -> Result<(), String> {
        self.send_command("Target.closeTarget", json!({ "targetId": target_id }))
            .await
            .map(|_| ())
    }

    /// Bring a tab to the front.
    pub async fn activate_target(&self, target_id: &str) -> Result<(), String> {
        self.send_command("Target.activateTarget", json!({ "targetId": target_id }))
            .await
            .map(|_| ())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Pull `result.value` out of a `Runtime.evaluate` result.
pub fn extract_value(result: Value) -> Result<Value, String> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details
            .pointer("/exception/description")
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("unknown exception");
        return Err(format!("JS exception: {}", text));
    }
    Ok(result
        .pointer("/result/value")
        .cloned()
        .unwrap_or(Value::Null))
}
