/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

//! Error-tolerant parsing of script lines.
//!
//! A half-typed line such as `fs.` or `ls('src', ` is first closed by a small
//! scanner that tracks open strings, brackets and template literals. The
//! closed text is handed to tree-sitter, and the node around the cursor is
//! lowered into a [`Node`] the completion engine can inspect. Anything the
//! scanner appended lies past the end of the original source; identifiers
//! found there become [`PLACEHOLDER`]s.

use tracing::trace;
use tree_sitter::{Node as SyntaxNode, Parser, Tree};

/// Name given to identifiers that were never typed.
///
/// A member access like `util.` gets this as its property name, and a
/// missing operand becomes an identifier with this name. The completion
/// engine reads it as "nothing typed yet", i.e. an empty prefix. The span of
/// a placeholder is always empty.
pub const PLACEHOLDER: &str = "✖";

/// Lines nesting deeper than this are not parsed; the cursor then sits on a
/// placeholder.
pub const MAX_NESTING: usize = 512;

/// Stand-in identifier appended where an operand is missing
const FILLER: &str = "_";

/// Wrapper nodes the locator looks through
const TRANSPARENT: &[&str] = &["program", "arguments", "parenthesized_expression", "ERROR"];

/// Nodes whose inner structure is never located
const OPAQUE: &[&str] = &["string", "regex", "comment", "number"];

/// Keywords that expect an operand when followed by whitespace
const OPERAND_KEYWORDS: &[&str] = &[
    "new", "typeof", "void", "delete", "await", "yield", "return", "throw", "case",
];

/// Binary keywords, which only expect an operand after a value
const BINARY_KEYWORDS: &[&str] = &["in", "of", "instanceof"];

/// Keywords after which `/` opens a regular expression
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "instanceof", "new", "delete", "void",
    "throw", "yield", "await", "of",
];

/// Byte range `[start, end)` in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Containment including the end offset
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Syntax node under the cursor
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Identifier {
        name: String,
    },
    StringLiteral {
        value: String,
        raw: String,
    },
    Member {
        object: Box<Node>,
        property: Box<Node>,
        computed: bool,
        optional: bool,
    },
    Call {
        callee: Box<Node>,
        arguments: Vec<Node>,
        constructor: bool, // `new callee(...)`
    },
    /// Any other syntax, tagged with the grammar's node kind
    Other {
        kind: &'static str,
    },
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// An empty identifier at `offset`
    pub fn placeholder(offset: usize) -> Self {
        Self::new(
            NodeKind::Identifier {
                name: PLACEHOLDER.to_string(),
            },
            Span::new(offset, offset),
        )
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(&self.kind, NodeKind::Identifier { name } if name == PLACEHOLDER)
    }

    /// The source text covered by this node
    pub fn source_text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.span.start..self.span.end).unwrap_or("")
    }

    /// Short name of the node kind, used in logs
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::StringLiteral { .. } => "StringLiteral",
            NodeKind::Member { .. } => "Member",
            NodeKind::Call {
                constructor: true, ..
            } => "Construct",
            NodeKind::Call { .. } => "Call",
            NodeKind::Other { kind } => kind,
        }
    }
}

/// Parses `source` and returns the innermost node enclosing `cursor`.
///
/// `None` means the cursor is not inside any statement or expression.
pub fn parse_and_locate(source: &str, cursor: usize) -> Option<Node> {
    let cursor = cursor.min(source.len());
    let scan = Scanner::scan(source);
    if scan.depth > MAX_NESTING {
        trace!(depth = scan.depth, "line nests too deep, not parsing");
        return Some(Node::placeholder(cursor));
    }

    let text = format!("{source}{}", scan.suffix);
    let tree = parse_text(&text)?;
    let node = locate(tree.root_node(), cursor)?;
    Some(lower(node, &text, source.len()))
}

/// Parses `source` after closing whatever it leaves open
pub fn parse(source: &str) -> Option<Tree> {
    parse_text(&repair(source))
}

/// `source` followed by the text that closes its open strings, comments,
/// brackets and template literals, plus a stand-in operand where one is
/// missing at the end.
pub fn repair(source: &str) -> String {
    format!("{source}{}", Scanner::scan(source).suffix)
}

fn parse_text(text: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    if let Err(err) = parser.set_language(&tree_sitter_javascript::LANGUAGE.into()) {
        trace!(%err, "grammar unavailable");
        return None;
    }
    parser.parse(text, None)
}

/// Walks down from `root` towards `cursor` and returns the innermost
/// locatable node. Siblings are tried in source order and the first one
/// containing the cursor wins.
fn locate(root: SyntaxNode<'_>, cursor: usize) -> Option<SyntaxNode<'_>> {
    let mut walker = root.walk();
    let mut found = None;

    'descend: loop {
        let node = walker.node();
        if !TRANSPARENT.contains(&node.kind()) {
            found = Some(node);
        }
        if OPAQUE.contains(&node.kind()) || !walker.goto_first_child() {
            break;
        }

        loop {
            let child = walker.node();
            let hidden = is_member(node)
                && matches!(walker.field_name(), Some("property" | "optional_chain"));
            if child.is_named()
                && !hidden
                && child.start_byte() <= cursor
                && cursor <= child.end_byte()
            {
                continue 'descend;
            }
            if !walker.goto_next_sibling() {
                break 'descend;
            }
        }
    }

    found
}

fn is_member(node: SyntaxNode<'_>) -> bool {
    matches!(node.kind(), "member_expression" | "subscript_expression")
}

fn clip(node: SyntaxNode<'_>, len: usize) -> Span {
    Span::new(node.start_byte().min(len), node.end_byte().min(len))
}

/// Converts the located node and its direct operands
fn lower(node: SyntaxNode<'_>, text: &str, len: usize) -> Node {
    let kind = match node.kind() {
        "member_expression" | "subscript_expression" => {
            let computed = node.kind() == "subscript_expression";
            let field = if computed { "index" } else { "property" };
            match (
                node.child_by_field_name("object"),
                node.child_by_field_name(field),
            ) {
                (Some(object), Some(property)) => NodeKind::Member {
                    object: Box::new(lower_operand(object, text, len)),
                    property: Box::new(lower_operand(property, text, len)),
                    computed,
                    optional: node.child_by_field_name("optional_chain").is_some(),
                },
                _ => NodeKind::Other { kind: node.kind() },
            }
        }
        "call_expression" | "new_expression" => {
            let constructor = node.kind() == "new_expression";
            let field = if constructor { "constructor" } else { "function" };
            let arguments = node.child_by_field_name("arguments");
            match node.child_by_field_name(field) {
                // A tagged template is not a call
                Some(_) if arguments.is_some_and(|args| args.kind() != "arguments") => {
                    NodeKind::Other { kind: node.kind() }
                }
                Some(callee) => NodeKind::Call {
                    callee: Box::new(lower_operand(callee, text, len)),
                    arguments: arguments
                        .map(|args| {
                            let mut walker = args.walk();
                            args.named_children(&mut walker)
                                .filter(|argument| argument.kind() != "comment")
                                .map(|argument| lower_operand(argument, text, len))
                                .collect()
                        })
                        .unwrap_or_default(),
                    constructor,
                },
                None => NodeKind::Other { kind: node.kind() },
            }
        }
        _ => return lower_operand(node, text, len),
    };
    Node::new(kind, clip(node, len))
}

/// Converts a node without looking at its children, except for strings
fn lower_operand(node: SyntaxNode<'_>, text: &str, len: usize) -> Node {
    let span = clip(node, len);
    let kind = match node.kind() {
        "identifier"
        | "property_identifier"
        | "shorthand_property_identifier"
        | "private_property_identifier" => {
            if node.is_missing() || node.start_byte() >= len {
                return Node::placeholder(span.start);
            }
            NodeKind::Identifier {
                name: text.get(node.byte_range()).unwrap_or("").to_string(),
            }
        }
        "string" => NodeKind::StringLiteral {
            value: string_value(node, text),
            raw: text.get(span.start..span.end).unwrap_or("").to_string(),
        },
        kind => NodeKind::Other { kind },
    };
    Node::new(kind, span)
}

fn string_value(node: SyntaxNode<'_>, text: &str) -> String {
    let mut value = String::new();
    let mut walker = node.walk();
    for part in node.named_children(&mut walker) {
        let Some(chunk) = text.get(part.byte_range()) else {
            continue;
        };
        match part.kind() {
            "escape_sequence" => unescape(chunk, &mut value),
            _ => value.push_str(chunk),
        }
    }
    value
}

/// Decodes one escape sequence, `\` included
fn unescape(sequence: &str, out: &mut String) {
    let body = sequence.strip_prefix('\\').unwrap_or(sequence);
    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return;
    };
    let decoded = match first {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'b' => Some('\u{8}'),
        'f' => Some('\u{c}'),
        'v' => Some('\u{b}'),
        '0' if body.len() == 1 => Some('\0'),
        'x' | 'u' => {
            let digits = body[1..].trim_start_matches('{').trim_end_matches('}');
            u32::from_str_radix(digits, 16).ok().and_then(char::from_u32)
        }
        // Line continuation
        '\n' | '\r' | '\u{2028}' | '\u{2029}' => return,
        _ => None,
    };
    match decoded {
        Some(ch) => out.push(ch),
        None => out.push_str(body),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    Paren,
    Bracket,
    Brace,
    /// Inside the text of a template literal
    Template,
    /// Inside `${ ... }` of a template literal
    Substitution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    Quoted(u8),
    Template,
    Regex { class: bool },
    LineComment,
    BlockComment,
}

/// The last significant token seen in code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last<'a> {
    Nothing,
    /// Identifier, keyword or number
    Word(&'a str),
    /// String, template or regex literal
    Literal,
    /// Opening bracket, `,` or `;`
    Separator,
    /// `)`, `]` or `}`
    Close,
    /// Run of operator characters
    Operator(&'a str),
}

/// Finds what a line leaves open, one byte at a time
struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    state: ScanState,
    stack: Vec<Open>,
    last: Last<'a>,
    before_last: Last<'a>,
    escaped: bool,
    depth: usize,
}

/// Outcome of a scan
struct Closing {
    suffix: String,
    depth: usize,
}

impl<'a> Scanner<'a> {
    fn scan(source: &'a str) -> Closing {
        let mut scanner = Scanner {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            state: ScanState::Code,
            stack: Vec::new(),
            last: Last::Nothing,
            before_last: Last::Nothing,
            escaped: false,
            depth: 0,
        };
        while scanner.pos < scanner.bytes.len() {
            scanner.step();
        }
        scanner.finish()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn token(&mut self, last: Last<'a>) {
        self.before_last = self.last;
        self.last = last;
    }

    fn push(&mut self, open: Open) {
        self.stack.push(open);
        self.depth = self.depth.max(self.stack.len());
    }

    fn step(&mut self) {
        let ch = self.bytes[self.pos];
        match self.state {
            ScanState::Quoted(quote) => {
                if self.escaped {
                    self.escaped = false;
                } else if ch == b'\\' {
                    self.escaped = true;
                } else if ch == quote {
                    self.state = ScanState::Code;
                    self.token(Last::Literal);
                } else if ch == b'\n' {
                    // Unterminated; the line ends the string
                    self.state = ScanState::Code;
                }
                self.pos += 1;
            }
            ScanState::Template => {
                if self.escaped {
                    self.escaped = false;
                } else if ch == b'\\' {
                    self.escaped = true;
                } else if ch == b'`' {
                    self.stack.pop();
                    self.state = ScanState::Code;
                    self.token(Last::Literal);
                } else if ch == b'$' && self.peek(1) == Some(b'{') {
                    self.push(Open::Substitution);
                    self.state = ScanState::Code;
                    self.token(Last::Separator);
                    self.pos += 1;
                }
                self.pos += 1;
            }
            ScanState::Regex { class } => {
                if self.escaped {
                    self.escaped = false;
                } else if ch == b'\\' {
                    self.escaped = true;
                } else if ch == b'[' {
                    self.state = ScanState::Regex { class: true };
                } else if ch == b']' {
                    self.state = ScanState::Regex { class: false };
                } else if ch == b'/' && !class {
                    self.state = ScanState::Code;
                    self.token(Last::Literal);
                    // Flags
                    self.pos += 1;
                    while self.peek(0).is_some_and(is_word_byte) {
                        self.pos += 1;
                    }
                    return;
                } else if ch == b'\n' {
                    self.state = ScanState::Code;
                }
                self.pos += 1;
            }
            ScanState::LineComment => {
                if ch == b'\n' {
                    self.state = ScanState::Code;
                }
                self.pos += 1;
            }
            ScanState::BlockComment => {
                if ch == b'*' && self.peek(1) == Some(b'/') {
                    self.state = ScanState::Code;
                    self.pos += 1;
                }
                self.pos += 1;
            }
            ScanState::Code => self.step_code(ch),
        }
    }

    fn step_code(&mut self, ch: u8) {
        match ch {
            b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
            b'\'' | b'"' => {
                self.state = ScanState::Quoted(ch);
                self.pos += 1;
            }
            b'`' => {
                self.push(Open::Template);
                self.state = ScanState::Template;
                self.pos += 1;
            }
            b'/' if self.peek(1) == Some(b'/') => {
                self.state = ScanState::LineComment;
                self.pos += 2;
            }
            b'/' if self.peek(1) == Some(b'*') => {
                self.state = ScanState::BlockComment;
                self.pos += 2;
            }
            b'/' if self.regex_allowed() => {
                self.state = ScanState::Regex { class: false };
                self.pos += 1;
            }
            b'(' | b'[' | b'{' => {
                self.push(match ch {
                    b'(' => Open::Paren,
                    b'[' => Open::Bracket,
                    _ => Open::Brace,
                });
                self.token(Last::Separator);
                self.pos += 1;
            }
            b')' | b']' | b'}' => {
                // Any closing bracket closes the innermost open one
                if self.stack.pop() == Some(Open::Substitution) {
                    self.state = ScanState::Template;
                } else {
                    self.token(Last::Close);
                }
                self.pos += 1;
            }
            b',' | b';' => {
                self.token(Last::Separator);
                self.pos += 1;
            }
            _ if is_word_byte(ch) => {
                let start = self.pos;
                let number = ch.is_ascii_digit();
                while self
                    .peek(0)
                    .is_some_and(|byte| is_word_byte(byte) || (number && byte == b'.'))
                {
                    self.pos += 1;
                }
                let source = self.source;
                self.token(Last::Word(&source[start..self.pos]));
            }
            _ if is_operator_byte(ch) => {
                let start = self.pos;
                while self.peek(0).is_some_and(is_operator_byte) {
                    self.pos += 1;
                }
                let source = self.source;
                let run = &source[start..self.pos];
                self.depth = self.depth.max(run.len());
                self.token(Last::Operator(run));
            }
            _ => self.pos += 1,
        }
    }

    fn regex_allowed(&self) -> bool {
        match self.last {
            Last::Nothing | Last::Separator | Last::Operator(_) => true,
            Last::Word(word) => REGEX_KEYWORDS.contains(&word),
            Last::Literal | Last::Close => false,
        }
    }

    /// Whether the line ends where an operand is expected
    fn needs_operand(&self) -> bool {
        let trailing_space = self
            .bytes
            .last()
            .is_some_and(|byte| byte.is_ascii_whitespace());
        match self.last {
            Last::Operator(run) => !run.ends_with("++") && !run.ends_with("--"),
            Last::Word(word) if trailing_space && OPERAND_KEYWORDS.contains(&word) => true,
            Last::Word(word) if trailing_space && BINARY_KEYWORDS.contains(&word) => matches!(
                self.before_last,
                Last::Word(_) | Last::Literal | Last::Close
            ),
            _ => false,
        }
    }

    fn finish(self) -> Closing {
        let mut suffix = String::new();
        match self.state {
            ScanState::Quoted(quote) => {
                if self.escaped {
                    suffix.push('\\');
                }
                suffix.push(char::from(quote));
            }
            ScanState::Regex { class } => {
                if self.escaped {
                    suffix.push('\\');
                }
                if class {
                    suffix.push(']');
                }
                suffix.push('/');
            }
            ScanState::Template if self.escaped => suffix.push('\\'),
            ScanState::LineComment => suffix.push('\n'),
            ScanState::BlockComment => suffix.push_str("*/"),
            ScanState::Code => {
                if self.needs_operand() {
                    suffix.push_str(FILLER);
                }
            }
            ScanState::Template => {}
        }

        for open in self.stack.iter().rev() {
            suffix.push(match open {
                Open::Paren => ')',
                Open::Bracket => ']',
                Open::Brace | Open::Substitution => '}',
                Open::Template => '`',
            });
        }

        Closing {
            suffix,
            depth: self.depth,
        }
    }
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte >= 0x80
}

fn is_operator_byte(byte: u8) -> bool {
    matches!(
        byte,
        b'=' | b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|' | b'^' | b'!' | b'~' | b'<' | b'>'
            | b'?' | b':' | b'.'
    )
}
