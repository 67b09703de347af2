use quick_xml::Writer;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::Decimal;

use crate::core::SifenError;

fn xml_io(e: std::io::Error) -> SifenError {
    SifenError::Xml(format!("XML write error: {e}"))
}

/// Writer that emits XML already in canonical (C14N) form.
///
/// No declaration, no indentation, every element written as a start/end
/// pair, C14N escaping for text and attribute values, namespace
/// declarations ahead of attributes and attributes sorted by name.
pub struct C14nWriter {
    writer: Writer<Vec<u8>>,
}

impl C14nWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    pub fn into_string(self) -> Result<String, SifenError> {
        let buf = self.writer.into_inner();
        String::from_utf8(buf).map_err(|e| SifenError::Xml(format!("XML UTF-8 error: {e}")))
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, SifenError> {
        self.start_element_with_attrs(name, &[])
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, SifenError> {
        let mut ordered: Vec<(&str, String)> = attrs
            .iter()
            .map(|(k, v)| (*k, escape_attr(v)))
            .collect();
        ordered.sort_by(|(a, _), (b, _)| attr_rank(a).cmp(&attr_rank(b)));

        let mut elem = BytesStart::new(name);
        for (k, v) in &ordered {
            elem.push_attribute(Attribute::from((k.as_bytes(), v.as_bytes())));
        }
        self.writer
            .write_event(Event::Start(elem))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, SifenError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn text(&mut self, text: &str) -> Result<&mut Self, SifenError> {
        if !text.is_empty() {
            self.writer
                .write_event(Event::Text(BytesText::from_escaped(escape_text(text))))
                .map_err(xml_io)?;
        }
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, SifenError> {
        self.start_element(name)?;
        self.text(text)?;
        self.end_element(name)
    }

    pub fn decimal_element(&mut self, name: &str, value: Decimal) -> Result<&mut Self, SifenError> {
        self.text_element(name, &format_decimal(value))
    }

    pub fn number_element(
        &mut self,
        name: &str,
        value: impl std::fmt::Display,
    ) -> Result<&mut Self, SifenError> {
        self.text_element(name, &value.to_string())
    }

    /// Insert an already-canonical fragment verbatim.
    pub fn raw(&mut self, fragment: &str) -> Result<&mut Self, SifenError> {
        self.writer.get_mut().extend_from_slice(fragment.as_bytes());
        Ok(self)
    }
}

impl Default for C14nWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Default namespace first, then prefixed declarations, then attributes;
/// each group by name.
fn attr_rank(name: &str) -> (u8, &str) {
    if name == "xmlns" {
        (0, name)
    } else if name.starts_with("xmlns:") {
        (1, name)
    } else {
        (2, name)
    }
}

/// C14N text node escaping.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
    out
}

/// C14N attribute value escaping.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
    out
}

/// Format a Decimal for DE output: plain notation, no trailing zeros.
pub fn format_decimal(d: Decimal) -> String {
    let n = d.normalize();
    if n.is_zero() {
        "0".to_string()
    } else {
        n.to_string()
    }
}
