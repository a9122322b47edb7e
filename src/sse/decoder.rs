use bytes::BytesMut;

/// One dispatched server sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Event {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

impl Event {
    /// events without a type, or typed `message`, are plain messages
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Chunks may split lines anywhere, incomplete lines stay buffered until the next feed.
#[derive(Debug, Default)]
pub(crate) struct Decoder {
    buf: BytesMut,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl Decoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Event> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            let line = &line[..pos];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if let Some(event) = self.line(&String::from_utf8_lossy(line)) {
                events.push(event);
            }
        }

        events
    }

    fn line(&mut self, line: &str) -> Option<Event> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            log::trace!("Sse comment {:?}", line);
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            other => log::trace!("Ignore sse field {:?}", other),
        }

        None
    }

    fn dispatch(&mut self) -> Option<Event> {
        let event = self.event.take();

        if self.data.is_empty() {
            return None;
        }

        Some(Event {
            event,
            id: self.last_id.clone(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
