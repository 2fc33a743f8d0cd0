use crate::span_info::SpanInfo;

/// A file listed in the TVFS root, with the spans its content is made of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub spans: Vec<SpanInfo>,
}

impl Entry {
    pub fn new_with_spans(name: String, spans: Vec<SpanInfo>) -> Self {
        Self { name, spans }
    }
}
