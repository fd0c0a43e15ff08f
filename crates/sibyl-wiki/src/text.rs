//! Plain-text extraction from rendered wiki pages.
//!
//! MediaWiki's `action=parse` output is a single `<div>` whose direct
//! children are the page body. Top-level `<h2>` headings split it into
//! sections. Paragraphs and list items are kept as lines, `<pre>` blocks
//! keep their whitespace, everything else contributes its text only.

use crate::error::WikiError;

/// Extracted text of one wiki page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub sections: Vec<Section>,
}

/// A run of page text under one heading. The lead section has no title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub content: String,
}

impl Page {
    /// Render the page as `# Title` lines followed by each section's body.
    pub fn content(&self) -> String {
        let mut text = String::new();
        for section in &self.sections {
            if !section.title.is_empty() {
                text.push_str("# ");
                text.push_str(&section.title);
                text.push('\n');
            }
            text.push_str(&section.content);
            text.push('\n');
        }
        text
    }
}

/// Extract the sections of a rendered page.
pub fn extract_text(html: &str) -> Result<Page, WikiError> {
    let nodes = parse(html);
    let root = nodes
        .iter()
        .find_map(first_div)
        .ok_or_else(|| WikiError::Extract("missing <div>".to_string()))?;

    let mut page = Page::default();
    let mut title = String::new();
    let mut content = String::new();
    for node in root {
        if node.is_element("h2") {
            if !content.is_empty() {
                page.sections.push(Section {
                    title,
                    content: content.trim().to_string(),
                });
                content.clear();
            }
            node_text(&mut content, node);
            title = content.trim().to_string();
            content.clear();
            continue;
        }
        node_text(&mut content, node);
    }
    if !content.is_empty() {
        page.sections.push(Section {
            title,
            content: content.trim().to_string(),
        });
    }

    Ok(page)
}

#[derive(Debug)]
enum Node {
    Element { name: String, children: Vec<Node> },
    Text(String),
}

impl Node {
    fn is_element(&self, tag: &str) -> bool {
        matches!(self, Node::Element { name, .. } if name == tag)
    }

    fn children(&self) -> &[Node] {
        match self {
            Node::Element { children, .. } => children,
            Node::Text(_) => &[],
        }
    }
}

fn first_div(node: &Node) -> Option<&[Node]> {
    if node.is_element("div") {
        return Some(node.children());
    }
    node.children().iter().find_map(first_div)
}

fn node_text(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.extend(text.chars().filter(|&c| c != '\n')),
        Node::Element { name, children } => match name.as_str() {
            "p" => {
                child_text(out, children);
                out.push('\n');
            }
            "ul" => {
                for item in children.iter().filter(|c| c.is_element("li")) {
                    out.push_str("- ");
                    node_text(out, item);
                    out.push('\n');
                }
            }
            "pre" => pre_text(out, node),
            _ => child_text(out, children),
        },
    }
}

fn child_text(out: &mut String, children: &[Node]) {
    for child in children {
        node_text(out, child);
    }
}

fn pre_text(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Element { children, .. } => {
            for child in children {
                pre_text(out, child);
            }
        }
    }
}

// Parsing

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose start tag implicitly ends an open `<p>`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "p", "div", "ul", "ol", "dl", "pre", "table", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

enum Token {
    Open { name: String, self_closing: bool },
    Close(String),
    Text(String),
}

fn tokenize(html: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = html;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.find("-->").map_or("", |end| &after[end + 3..]);
            continue;
        }
        if rest.starts_with('<') {
            if let Some(end) = rest.find('>') {
                let tag = &rest[1..end];
                rest = &rest[end + 1..];
                if let Some(name) = tag.strip_prefix('/') {
                    tokens.push(Token::Close(tag_name(name)));
                } else if tag.starts_with('!') || tag.starts_with('?') {
                    // doctype or processing instruction
                } else {
                    let name = tag_name(tag);
                    if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                        let close = format!("</{name}");
                        rest = rest.find(&close).map_or("", |at| &rest[at..]);
                        continue;
                    }
                    tokens.push(Token::Open {
                        self_closing: tag.ends_with('/'),
                        name,
                    });
                }
                continue;
            }
        }
        let first = rest.chars().next().map_or(1, char::len_utf8);
        let end = rest[first..].find('<').map_or(rest.len(), |at| at + first);
        tokens.push(Token::Text(decode_entities(&rest[..end])));
        rest = &rest[end..];
    }
    tokens
}

fn tag_name(tag: &str) -> String {
    tag.trim_start()
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn parse(html: &str) -> Vec<Node> {
    let mut stack: Vec<(String, Vec<Node>)> = vec![(String::new(), Vec::new())];
    for token in tokenize(html) {
        match token {
            Token::Text(text) => push_node(&mut stack, Node::Text(text)),
            Token::Open { name, self_closing } => {
                if CLOSES_PARAGRAPH.contains(&name.as_str()) && top_is(&stack, "p") {
                    close_top(&mut stack);
                }
                if name == "li" && top_is(&stack, "li") {
                    close_top(&mut stack);
                }
                if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
                    push_node(
                        &mut stack,
                        Node::Element {
                            name,
                            children: Vec::new(),
                        },
                    );
                } else {
                    stack.push((name, Vec::new()));
                }
            }
            Token::Close(name) => {
                // unmatched end tags are dropped
                if let Some(pos) = stack.iter().skip(1).rposition(|(open, _)| *open == name) {
                    while stack.len() > pos + 1 {
                        close_top(&mut stack);
                    }
                }
            }
        }
    }
    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().map(|(_, nodes)| nodes).unwrap_or_default()
}

fn top_is(stack: &[(String, Vec<Node>)], tag: &str) -> bool {
    stack.len() > 1 && stack.last().is_some_and(|(name, _)| name == tag)
}

fn push_node(stack: &mut [(String, Vec<Node>)], node: Node) {
    if let Some((_, children)) = stack.last_mut() {
        children.push(node);
    }
}

fn close_top(stack: &mut Vec<(String, Vec<Node>)>) {
    if stack.len() < 2 {
        return;
    }
    if let Some((name, children)) = stack.pop() {
        push_node(stack, Node::Element { name, children });
    }
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}
