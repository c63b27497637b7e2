/// Server-sent-events line parsing shared by the ChatGPT adapter and the
/// interceptor's stream splitter.
///
/// SSE format: `event: <type>\ndata: <json>\n\n`.
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

/// The stream terminator frame.
pub const SSE_DONE: &str = "[DONE]";

/// Extract the data payloads from a complete SSE transcript, stopping at
/// the `[DONE]` terminator. A missing terminator is tolerated (truncated
/// streams still yield their frames).
pub fn data_frames(transcript: &str) -> Vec<String> {
    let mut frames = Vec::new();
    for line in transcript.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
            if data == SSE_DONE {
                break;
            }
            frames.push(data);
        }
    }
    frames
}
