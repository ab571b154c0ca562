//! Incremental decoder for the worker's JSON event stream.
//!
//! The worker prints one JSON object per line on stdout. Output arrives in
//! arbitrary chunks, so [`StreamDecoder`] keeps the unterminated tail of the
//! last chunk and only decodes complete lines. Splitting happens on raw
//! bytes, which keeps multi-byte characters intact across chunk boundaries;
//! feeding the same bytes in any chunking yields the same updates.
//!
//! Malformed lines and unknown event types are skipped.

use serde::Deserialize;
use serde_json::Value;

/// Characters of trailing assistant text considered for an activity preview.
const SNIPPET_TAIL_CHARS: usize = 80;

/// A progress change decoded from the worker stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// A tool started; `activity` summarizes what it is doing.
    ToolStarted {
        tool: String,
        activity: Option<String>,
    },
    ToolFinished,
    /// An assistant turn ended. Counters are cumulative for the run.
    TurnCompleted { turns: u32, cost: f64 },
    /// Latest line of assistant thinking or text.
    Activity(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerEvent {
    ToolExecutionStart {
        #[serde(rename = "toolName", default)]
        tool_name: Option<String>,
        #[serde(default)]
        args: Value,
    },
    ToolExecutionEnd,
    MessageEnd {
        #[serde(default)]
        message: Option<Message>,
    },
    MessageUpdate {
        #[serde(default)]
        message: Option<Message>,
        #[serde(rename = "assistantMessageEvent", default)]
        content: Option<ContentEvent>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    role: String,
    #[serde(default)]
    usage: Option<Usage>,
}

impl Message {
    fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    cost: Option<Cost>,
}

#[derive(Debug, Deserialize)]
struct Cost {
    #[serde(default)]
    total: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentEvent {
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Line-buffered decoder state for one worker run.
#[derive(Debug)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    preview_chars: usize,
    turns: u32,
    cost: f64,
}

impl StreamDecoder {
    pub fn new(preview_chars: usize) -> Self {
        Self {
            buffer: Vec::new(),
            preview_chars,
            turns: 0,
            cost: 0.0,
        }
    }

    /// Assistant turns seen so far.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Cost accumulated so far.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Consume a chunk and return updates for every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ProgressUpdate> {
        self.buffer.extend_from_slice(chunk);

        let mut updates = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line, &mut updates);
        }
        updates
    }

    /// Decode whatever is left once the stream has closed.
    pub fn finish(&mut self) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut updates);
        }
        updates
    }

    fn decode_line(&mut self, line: &[u8], updates: &mut Vec<ProgressUpdate>) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let event: WorkerEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::trace!(error = %e, "skipping malformed worker event");
                return;
            }
        };

        match event {
            WorkerEvent::ToolExecutionStart { tool_name, args } => {
                let tool = tool_name.unwrap_or_else(|| "unknown".to_string());
                let activity = tool_activity(&tool, &args, self.preview_chars);
                updates.push(ProgressUpdate::ToolStarted { tool, activity });
            }
            WorkerEvent::ToolExecutionEnd => updates.push(ProgressUpdate::ToolFinished),
            WorkerEvent::MessageEnd {
                message: Some(message),
            } if message.is_assistant() => {
                self.turns += 1;
                self.cost += message
                    .usage
                    .and_then(|u| u.cost)
                    .and_then(|c| c.total)
                    .unwrap_or(0.0);
                updates.push(ProgressUpdate::TurnCompleted {
                    turns: self.turns,
                    cost: self.cost,
                });
            }
            WorkerEvent::MessageUpdate {
                message: Some(message),
                content: Some(content),
            } if message.is_assistant() => {
                let activity = match content {
                    ContentEvent::Thinking { thinking } => {
                        snippet(&thinking, self.preview_chars).map(|s| format!("thinking: {}", s))
                    }
                    ContentEvent::Text { text } => snippet(&text, self.preview_chars),
                    ContentEvent::Other => None,
                };
                if let Some(activity) = activity {
                    updates.push(ProgressUpdate::Activity(activity));
                }
            }
            _ => {}
        }
    }
}

/// Human-readable summary of a tool invocation.
fn tool_activity(tool: &str, args: &Value, preview_chars: usize) -> Option<String> {
    let arg = |key: &str| args.get(key).and_then(Value::as_str);

    match tool {
        "bash" => {
            let command = arg("command")?;
            let first_line = command.lines().next().unwrap_or("");
            let mut preview: String = first_line.chars().take(preview_chars).collect();
            if command.chars().count() > preview_chars {
                preview.push('…');
            }
            Some(format!("$ {}", preview))
        }
        "read" => arg("path").map(|p| format!("reading {}", p)),
        "write" => arg("path").map(|p| format!("writing {}", p)),
        "edit" => arg("path").map(|p| format!("editing {}", p)),
        _ => None,
    }
}

/// Last line of the tail of `text`, truncated to `preview_chars`.
fn snippet(text: &str, preview_chars: usize) -> Option<String> {
    let char_count = text.chars().count();
    let tail: String = text
        .chars()
        .skip(char_count.saturating_sub(SNIPPET_TAIL_CHARS))
        .collect();
    let last = tail.split('\n').next_back()?.trim();
    if last.is_empty() {
        return None;
    }

    Some(truncate_chars(last, preview_chars))
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}
