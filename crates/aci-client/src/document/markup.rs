//! Markup (XML) codec for APIC documents
//!
//! Only the subset the APIC emits is understood. The grammar is:
//!
//! ```text
//! document   := prolog* element+
//! prolog     := "<?" ... "?>" | "<!--" ... "-->"
//! element    := "<" name attribute* ( "/>" | ">" element* "</" name ">" )
//! attribute  := name "=" ( "'" chars "'" | '"' chars '"' )
//! ```
//!
//! Text content between elements is rejected. A top-level `imdata` element
//! is the collection envelope; its `totalCount` attribute becomes the
//! declared count.

use super::{Content, ManagedObject};
use crate::error::AciError;

const ENVELOPE: &str = "imdata";
const TOTAL_COUNT: &str = "totalCount";
/// Deepest element nesting accepted before the document is rejected
const MAX_DEPTH: usize = 128;

/// Parse a markup document into its content tree
pub(crate) fn parse(text: &str) -> Result<Content, AciError> {
    let mut parser = Parser::new(text);
    parser.skip_prolog()?;

    let mut elements = Vec::new();
    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            break;
        }
        elements.push(parser.element(0)?);
    }

    if elements.len() == 1 && elements[0].class() == ENVELOPE {
        let envelope = elements.remove(0);
        let total_count = match envelope.attribute(TOTAL_COUNT) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                AciError::parse(0, format!("totalCount {raw:?} is not a number"))
            })?),
            None => None,
        };
        return Ok(Content::Collection {
            total_count,
            items: envelope.children.unwrap_or_default(),
        });
    }

    match elements.len() {
        0 => Err(AciError::parse(parser.pos, "document contains no elements")),
        1 => Ok(Content::Record(elements.remove(0))),
        _ => Ok(Content::Collection {
            total_count: None,
            items: elements,
        }),
    }
}

/// Emit content as markup
pub(crate) fn emit(content: &Content) -> String {
    let mut out = String::new();
    match content {
        Content::Record(object) => write_object(&mut out, object, 0),
        Content::Collection { total_count, items } => {
            match total_count {
                Some(count) => out.push_str(&format!("<{ENVELOPE} {TOTAL_COUNT}=\"{count}\">\n")),
                None => out.push_str(&format!("<{ENVELOPE}>\n")),
            }
            for item in items {
                write_object(&mut out, item, 1);
            }
            out.push_str(&format!("</{ENVELOPE}>\n"));
        }
    }
    out
}

/// Emit a single object (and its subtree) as markup
pub(crate) fn emit_object(object: &ManagedObject) -> String {
    let mut out = String::new();
    write_object(&mut out, object, 0);
    out
}

fn write_object(out: &mut String, object: &ManagedObject, depth: usize) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push('<');
    out.push_str(object.class());
    for (name, value) in object.attributes() {
        out.push(' ');
        out.push_str(name);
        out.push('=');
        out.push_str(&quote(value));
    }
    match object.children() {
        None => out.push_str("/>\n"),
        Some(children) => {
            out.push_str(">\n");
            for child in children {
                write_object(out, child, depth + 1);
            }
            out.push_str(&indent);
            out.push_str("</");
            out.push_str(object.class());
            out.push_str(">\n");
        }
    }
}

/// Quote an attribute value, single quotes unless the value contains one
fn quote(value: &str) -> String {
    let escaped = value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    if !escaped.contains('\'') {
        format!("'{escaped}'")
    } else if !escaped.contains('"') {
        format!("\"{escaped}\"")
    } else {
        format!("'{}'", escaped.replace('\'', "&apos;"))
    }
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), AciError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(AciError::parse(self.pos, format!("expected {token:?}")))
        }
    }

    /// Skip `<?xml ...?>` declarations and comments ahead of the first element
    fn skip_prolog(&mut self) -> Result<(), AciError> {
        loop {
            self.skip_whitespace();
            let terminator = if self.rest().starts_with("<?") {
                "?>"
            } else if self.rest().starts_with("<!--") {
                "-->"
            } else {
                return Ok(());
            };
            match self.rest().find(terminator) {
                Some(end) => self.pos += end + terminator.len(),
                None => return Err(AciError::parse(self.pos, format!("unterminated prolog, expected {terminator:?}"))),
            }
        }
    }

    fn name(&mut self) -> Result<&'a str, AciError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(AciError::parse(self.pos, "expected a name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn quoted(&mut self) -> Result<String, AciError> {
        let quote = match self.peek() {
            Some(c @ ('\'' | '"')) => c,
            _ => return Err(AciError::parse(self.pos, "expected a quoted attribute value")),
        };
        let start = self.pos + 1;
        let end = self.src[start..]
            .find(quote)
            .ok_or_else(|| AciError::parse(self.pos, "unterminated attribute value"))?;
        self.pos = start + end + 1;
        Ok(unescape(&self.src[start..start + end]))
    }

    fn element(&mut self, depth: usize) -> Result<ManagedObject, AciError> {
        if depth >= MAX_DEPTH {
            return Err(AciError::parse(self.pos, format!("elements nested deeper than {MAX_DEPTH}")));
        }
        self.expect("<")?;
        let class = self.name()?;
        let mut object = ManagedObject::new(class);

        loop {
            self.skip_whitespace();
            if self.eat("/>") {
                return Ok(object);
            }
            if self.eat(">") {
                break;
            }
            let at = self.pos;
            let name = self.name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let value = self.quoted()?;
            if object.attribute(name).is_some() {
                return Err(AciError::parse(at, format!("duplicate attribute {name} on {class}")));
            }
            object.attributes.push((name.to_string(), value));
        }

        let mut children = Vec::new();
        loop {
            self.skip_whitespace();
            if self.eat("</") {
                let at = self.pos;
                let closing = self.name()?;
                if closing != class {
                    return Err(AciError::parse(at, format!("expected </{class}>, found </{closing}>")));
                }
                self.skip_whitespace();
                self.expect(">")?;
                object.children = Some(children);
                return Ok(object);
            }
            match self.peek() {
                Some('<') => children.push(self.element(depth + 1)?),
                Some(_) => return Err(AciError::parse(self.pos, format!("unexpected text inside <{class}>"))),
                None => return Err(AciError::parse(self.pos, format!("unterminated element <{class}>"))),
            }
        }
    }
}
