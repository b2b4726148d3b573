use serde_json::Value;

/// One decoded part of a multipart batch response. Non-JSON bodies are
/// kept as `Value::String`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPart {
    pub content_type: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub parts: Vec<ParsedPart>,
    pub terminated: bool,
}

impl ParsedResponse {
    /// The `(id, body)` pair of a keyed part.
    pub fn entry(&self, index: usize) -> (&str, &Value) {
        let map = self.parts[index]
            .body
            .as_object()
            .expect("keyed part is an object");
        assert_eq!(map.len(), 1, "keyed part has exactly one id");
        let (id, body) = map.iter().next().expect("one entry");
        (id.as_str(), body)
    }

    pub fn ids(&self) -> Vec<&str> {
        (0..self.parts.len()).map(|i| self.entry(i).0).collect()
    }
}

/// Splits a raw response on `--<boundary>`. JSON parts are decoded; any
/// other part keeps its body as a string.
pub fn parse_multipart(raw: &[u8], boundary: &str) -> ParsedResponse {
    let text = std::str::from_utf8(raw).expect("response is utf-8");
    let delimiter = format!("--{boundary}");
    let terminator = format!("--{boundary}--\r\n");

    let (text, terminated) = match text.strip_suffix(&terminator) {
        Some(rest) => (rest, true),
        None => (text, false),
    };

    let mut segments = text.split(delimiter.as_str());
    assert_eq!(segments.next(), Some(""), "response starts with a delimiter");

    let parts = segments
        .map(|segment| {
            let segment = segment.strip_prefix("\r\n").expect("delimiter line ends");
            let (headers, content) = segment
                .split_once("\r\n\r\n")
                .expect("part has a header block");
            let content_type = headers
                .strip_prefix("Content-Type: ")
                .expect("part declares its content type")
                .to_string();
            let content = content.strip_suffix("\r\n").expect("part ends with CRLF");
            let body = if content_type == "application/json" {
                serde_json::from_str(content).expect("part body is JSON")
            } else {
                Value::String(content.to_string())
            };
            ParsedPart { content_type, body }
        })
        .collect();

    ParsedResponse { parts, terminated }
}
