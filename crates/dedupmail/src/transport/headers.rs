//! Header block parsing into fingerprint input.

use std::collections::HashMap;

use log::debug;
use mail_parser::{HeaderForm, HeaderName, Message, MessageParser};

use crate::fingerprint::HeaderDigestInput;

/// Header fields requested from the server for each candidate.
pub const HEADER_FIELDS: &[&str] = &["MESSAGE-ID", "DATE", "FROM", "TO", "SUBJECT"];

/// The parts of one header FETCH response the fingerprint needs.
#[derive(Debug, Clone, Copy)]
pub struct HeaderResponse<'a> {
    pub uid: Option<u32>,
    pub size: Option<u32>,
    pub header: Option<&'a [u8]>,
}

/// Builds fingerprint input from a raw header block and the message size.
///
/// Date, From, To and Subject keep the text as sent, with encoded words
/// decoded; nothing is parsed and re-rendered, so headers a parser would
/// reject still tell messages apart. Missing headers become empty strings.
pub fn digest_input_from_header(raw: &[u8], size: u64) -> HeaderDigestInput {
    let Some(message) = MessageParser::default().parse_headers(raw) else {
        return HeaderDigestInput {
            size,
            ..HeaderDigestInput::default()
        };
    };

    let message_id = match message.message_id() {
        Some(id) => id.to_string(),
        None => raw_text(&message, HeaderName::MessageId),
    };

    HeaderDigestInput {
        message_id,
        date: header_text(&message, HeaderName::Date),
        from: header_text(&message, HeaderName::From),
        to: header_text(&message, HeaderName::To),
        subject: header_text(&message, HeaderName::Subject),
        size,
    }
}

/// Collects fingerprint input per UID from one header FETCH.
///
/// Responses without a UID, a size or a header section are skipped, so
/// their UIDs read as vanished. The first complete response for a UID wins.
pub fn collect_digest_inputs<'a>(
    responses: impl IntoIterator<Item = HeaderResponse<'a>>,
) -> HashMap<u32, HeaderDigestInput> {
    let mut inputs = HashMap::new();
    for response in responses {
        let (Some(uid), Some(size), Some(header)) = (response.uid, response.size, response.header)
        else {
            debug!("Skipping incomplete FETCH response for UID {:?}", response.uid);
            continue;
        };
        inputs
            .entry(uid)
            .or_insert_with(|| digest_input_from_header(header, u64::from(size)));
    }
    inputs
}

/// First occurrence of `name` as unstructured text with encoded words decoded.
fn header_text<'x>(message: &Message<'x>, name: HeaderName<'x>) -> String {
    let decoded = message
        .header_as(name.clone(), HeaderForm::Text)
        .into_iter()
        .next()
        .and_then(|value| value.as_text().map(str::to_string));

    match decoded {
        Some(text) if !text.is_empty() => text,
        _ => raw_text(message, name),
    }
}

fn raw_text<'x>(message: &Message<'x>, name: HeaderName<'x>) -> String {
    message
        .header_raw(name)
        .map(|raw| raw.trim().to_string())
        .unwrap_or_default()
}
