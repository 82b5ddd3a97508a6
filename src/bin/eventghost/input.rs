use eventghost::EventRequest;
use serde_json::Value;

/// One line of the stdin control protocol.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    /// `Prefix.Suffix [payload]`
    Trigger(EventRequest),
    /// `+Prefix.Suffix [payload]`
    Press(EventRequest),
    /// `-Prefix.Suffix`
    Release(String),
}

pub(crate) fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    if let Some(rest) = line.strip_prefix('-') {
        let name = rest.split_whitespace().next()?;
        return Some(Command::Release(name.to_string()));
    }
    if let Some(rest) = line.strip_prefix('+') {
        return parse_request(rest).map(Command::Press);
    }
    parse_request(line).map(Command::Trigger)
}

fn parse_request(text: &str) -> Option<EventRequest> {
    let text = text.trim();
    let (name, rest) = match text.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (text, ""),
    };
    if name.is_empty() {
        return None;
    }
    // Everything before the first dot is the prefix; the suffix may contain more dots.
    let request = match name.split_once('.') {
        Some((prefix, suffix)) => EventRequest::new(suffix).prefix(prefix),
        None => EventRequest::new("").prefix(name),
    };
    if rest.is_empty() {
        return Some(request);
    }
    let payload =
        serde_json::from_str::<Value>(rest).unwrap_or_else(|_| Value::String(rest.to_string()));
    Some(request.payload(payload))
}
