use quick_xml::Reader;
use quick_xml::events::Event;

use crate::core::SifenError;

/// A text-bearing element found while scanning a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    /// Local names from the root down to this element, prefixes stripped.
    pub path: Vec<String>,
    pub text: String,
}

impl Leaf {
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// Whether `ancestor` appears anywhere above this element.
    pub fn within(&self, ancestor: &str) -> bool {
        self.path.iter().rev().skip(1).any(|p| p == ancestor)
    }
}

fn local_name(qname: &[u8]) -> String {
    let name = std::str::from_utf8(qname).unwrap_or("");
    name.rsplit(':').next().unwrap_or(name).to_string()
}

/// Collect every non-empty text node with the path of its element.
///
/// SOAP envelopes put the same element under different prefixes depending
/// on the server, so matching is done on local names.
pub fn leaf_texts(xml: &str) -> Result<Vec<Leaf>, SifenError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut leaves = Vec::new();
    let mut depth_seen = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(local_name(e.name().as_ref()));
                depth_seen = true;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| SifenError::Xml(format!("XML parse error: {e}")))?
                    .to_string();
                if !text.is_empty() && !path.is_empty() {
                    leaves.push(Leaf {
                        path: path.clone(),
                        text,
                    });
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).trim().to_string();
                if !text.is_empty() && !path.is_empty() {
                    leaves.push(Leaf {
                        path: path.clone(),
                        text,
                    });
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SifenError::Xml(format!("XML parse error: {e}")));
            }
            _ => {}
        }
    }

    if !depth_seen {
        return Err(SifenError::Xml("document has no elements".into()));
    }
    if !path.is_empty() {
        return Err(SifenError::Xml(format!("unclosed element {:?}", path.join("/"))));
    }
    Ok(leaves)
}

/// Text of the first element named `name`.
pub fn first_text<'a>(leaves: &'a [Leaf], name: &str) -> Option<&'a str> {
    leaves
        .iter()
        .find(|l| l.name() == name)
        .map(|l| l.text.as_str())
}
