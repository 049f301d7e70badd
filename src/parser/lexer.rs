//! Lexer for the command language.
//!
//! Tokenizes raw input into a stream of tokens the parser consumes.
//! It handles:
//! - One- and two-character operators (two-character matched greedily)
//! - Words with single/double/ANSI-C/locale quoting rules
//! - Here-documents (`<<`, `<<-`)
//! - Process substitution `<(...)` / `>(...)` captured as opaque words
//! - Reserved-word classification by literal match
//!
//! The lexer is total: it never fails for any input. Malformed text
//! produces best-effort word tokens; rejecting them is the parser's job.

use std::collections::HashMap;

/// Token kinds. A closed enumeration; the parser matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Newline,

    // Separators and list operators
    Semi,   // ;
    DSemi,  // ;; (case item terminator)
    Amp,    // &
    AndAnd, // &&
    OrOr,   // ||
    Pipe,   // |

    // Redirections
    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    DLessDash, // <<-
    LessGreat, // <>

    // Grouping
    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }

    // Reserved words (classified at tokenization, honored contextually
    // by the parser)
    If,
    Then,
    Else,
    Elif,
    Fi,
    For,
    While,
    Until,
    Do,
    Done,
    Case,
    Esac,
    In,
    Function,

    /// Generic word: command names, arguments, patterns, assignment text
    Word,
    /// Digit run directly before a redirection operator (`2> err`)
    Number,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Newline => "NEWLINE",
            Self::Semi => ";",
            Self::DSemi => ";;",
            Self::Amp => "&",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Pipe => "|",
            Self::Less => "<",
            Self::Great => ">",
            Self::DLess => "<<",
            Self::DGreat => ">>",
            Self::DLessDash => "<<-",
            Self::LessGreat => "<>",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::If => "if",
            Self::Then => "then",
            Self::Else => "else",
            Self::Elif => "elif",
            Self::Fi => "fi",
            Self::For => "for",
            Self::While => "while",
            Self::Until => "until",
            Self::Do => "do",
            Self::Done => "done",
            Self::Case => "case",
            Self::Esac => "esac",
            Self::In => "in",
            Self::Function => "function",
            Self::Word => "WORD",
            Self::Number => "NUMBER",
        }
    }

    /// True for the reserved-word kinds. The parser treats these as
    /// plain words outside command-starting position (`echo if`).
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Self::If
                | Self::Then
                | Self::Else
                | Self::Elif
                | Self::Fi
                | Self::For
                | Self::While
                | Self::Until
                | Self::Do
                | Self::Done
                | Self::Case
                | Self::Esac
                | Self::In
                | Self::Function
        )
    }
}

/// A token produced by the lexer. Immutable once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset in the original input
    pub position: usize,
    pub line: usize,
    pub column: usize,
    /// Any part of the word was quoted
    pub quoted: bool,
    /// The word was entirely single-quoted
    pub single_quoted: bool,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        text: impl Into<String>,
        position: usize,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
            line,
            column,
            quoted: false,
            single_quoted: false,
        }
    }
}

lazy_static::lazy_static! {
    /// Reserved words, matched literally against unquoted word text.
    static ref RESERVED_WORDS: HashMap<&'static str, TokenKind> = {
        let mut m = HashMap::new();
        m.insert("if", TokenKind::If);
        m.insert("then", TokenKind::Then);
        m.insert("else", TokenKind::Else);
        m.insert("elif", TokenKind::Elif);
        m.insert("fi", TokenKind::Fi);
        m.insert("for", TokenKind::For);
        m.insert("while", TokenKind::While);
        m.insert("until", TokenKind::Until);
        m.insert("do", TokenKind::Do);
        m.insert("done", TokenKind::Done);
        m.insert("case", TokenKind::Case);
        m.insert("esac", TokenKind::Esac);
        m.insert("in", TokenKind::In);
        m.insert("function", TokenKind::Function);
        m
    };
}

/// Two-character operators, tried greedily before single characters.
const TWO_CHAR_OPS: &[(&str, TokenKind)] = &[
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    (">>", TokenKind::DGreat),
    ("<<", TokenKind::DLess),
    ("<>", TokenKind::LessGreat),
    (";;", TokenKind::DSemi),
];

/// Single-character operators.
const SINGLE_CHAR_OPS: &[(char, TokenKind)] = &[
    ('|', TokenKind::Pipe),
    ('&', TokenKind::Amp),
    (';', TokenKind::Semi),
    ('(', TokenKind::LParen),
    (')', TokenKind::RParen),
    ('<', TokenKind::Less),
    ('>', TokenKind::Great),
];

/// Characters that terminate an unquoted word.
fn is_word_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

/// Here-document registered at its operator, collected after the next
/// newline.
#[derive(Debug, Clone)]
struct PendingHeredoc {
    delimiter: String,
    strip_tabs: bool,
    /// Index of the delimiter token to patch with the collected body
    token_index: usize,
}

/// Streaming tokenizer over a character vector.
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    pending_heredocs: Vec<PendingHeredoc>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            pending_heredocs: Vec::new(),
        }
    }

    /// Tokenize the entire input. Always succeeds and always ends with
    /// an EOF token.
    pub fn tokenize(mut self) -> Vec<Token> {
        while self.pos < self.input.len() {
            // Collect pending here-document bodies right after a newline
            if !self.pending_heredocs.is_empty()
                && self.tokens.last().map(|t| t.kind) == Some(TokenKind::Newline)
            {
                self.read_heredoc_bodies();
                continue;
            }

            self.skip_blanks_and_comments();
            if self.pos >= self.input.len() {
                break;
            }

            if let Some(token) = self.next_token() {
                self.tokens.push(token);
            }
        }

        // Heredocs terminated by end of input rather than a newline
        if !self.pending_heredocs.is_empty() {
            self.read_heredoc_bodies();
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            "",
            self.pos,
            self.line,
            self.column,
        ));
        self.tokens
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skip spaces, tabs, line continuations, and comments. Newlines are
    /// significant and left in place.
    fn skip_blanks_and_comments(&mut self) {
        loop {
            match self.peek(0) {
                Some(' ') | Some('\t') => {
                    self.advance();
                }
                // Backslash-newline is a line continuation
                Some('\\') if self.peek(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek(0) {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let c = self.peek(0)?;

        if c == '\n' {
            self.advance();
            return Some(Token::new(TokenKind::Newline, "\n", start, line, column));
        }

        // Process substitution before operator matching: <( and >( are
        // captured whole, with balanced parentheses, as one opaque word.
        if (c == '<' || c == '>') && self.peek(1) == Some('(') {
            let text = self.read_balanced_parens_word();
            return Some(Token::new(TokenKind::Word, text, start, line, column));
        }

        // Heredoc operators (three-char <<- first, then <<)
        if c == '<' && self.peek(1) == Some('<') {
            let strip_tabs = self.peek(2) == Some('-');
            self.advance();
            self.advance();
            if strip_tabs {
                self.advance();
            }
            let kind = if strip_tabs {
                TokenKind::DLessDash
            } else {
                TokenKind::DLess
            };
            self.tokens.push(Token::new(kind, kind.as_str(), start, line, column));
            self.read_heredoc_delimiter();
            return None;
        }

        // Two-character operators, matched greedily
        if let Some(next) = self.peek(1) {
            let pair: String = [c, next].iter().collect();
            for (op, kind) in TWO_CHAR_OPS {
                if pair == *op {
                    self.advance();
                    self.advance();
                    return Some(Token::new(*kind, *op, start, line, column));
                }
            }
        }

        // Single-character operators
        for (op, kind) in SINGLE_CHAR_OPS {
            if c == *op {
                self.advance();
                return Some(Token::new(*kind, c.to_string(), start, line, column));
            }
        }

        // Standalone braces are grouping tokens; otherwise `{` starts a
        // word (brace expansion text like {a,b})
        if c == '{' && self.peek(1).map_or(true, |n| n == ' ' || n == '\t' || n == '\n') {
            self.advance();
            return Some(Token::new(TokenKind::LBrace, "{", start, line, column));
        }
        // `}` glued to word text never reaches here; read_word consumes it
        if c == '}' && self.peek(1).map_or(true, is_word_boundary) {
            self.advance();
            return Some(Token::new(TokenKind::RBrace, "}", start, line, column));
        }

        // Digit run directly before a redirection operator is an fd number
        if c.is_ascii_digit() {
            let mut i = 0;
            while self.peek(i).map_or(false, |d| d.is_ascii_digit()) {
                i += 1;
            }
            if matches!(self.peek(i), Some('<') | Some('>')) {
                let mut text = String::new();
                for _ in 0..i {
                    if let Some(d) = self.advance() {
                        text.push(d);
                    }
                }
                return Some(Token::new(TokenKind::Number, text, start, line, column));
            }
        }

        // Everything else is a word
        Some(self.read_word(start, line, column))
    }

    /// Capture `<(...)` / `>(...)` including the wrapper, with balanced
    /// inner parentheses, as one word.
    fn read_balanced_parens_word(&mut self) -> String {
        let mut text = String::new();
        // direction char and opening paren
        if let Some(c) = self.advance() {
            text.push(c);
        }
        if let Some(c) = self.advance() {
            text.push(c);
        }
        let mut depth = 1;
        while depth > 0 {
            match self.advance() {
                Some('(') => {
                    depth += 1;
                    text.push('(');
                }
                Some(')') => {
                    depth -= 1;
                    text.push(')');
                }
                Some(c) => text.push(c),
                None => break,
            }
        }
        text
    }

    /// Read the delimiter word after a heredoc operator and register the
    /// pending body collection. The delimiter token is emitted as a word
    /// and later patched to hold the body text.
    fn read_heredoc_delimiter(&mut self) {
        while matches!(self.peek(0), Some(' ') | Some('\t')) {
            self.advance();
        }
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let mut delimiter = String::new();
        let mut quoted = false;
        while let Some(c) = self.peek(0) {
            if is_word_boundary(c) {
                break;
            }
            if c == '\'' || c == '"' {
                quoted = true;
                let quote = c;
                self.advance();
                while let Some(inner) = self.peek(0) {
                    if inner == quote {
                        self.advance();
                        break;
                    }
                    delimiter.push(inner);
                    self.advance();
                }
                continue;
            }
            delimiter.push(c);
            self.advance();
        }

        let strip_tabs = self.tokens.last().map(|t| t.kind) == Some(TokenKind::DLessDash);
        let mut token = Token::new(TokenKind::Word, "", start, line, column);
        token.quoted = quoted;
        self.tokens.push(token);
        self.pending_heredocs.push(PendingHeredoc {
            delimiter,
            strip_tabs,
            token_index: self.tokens.len() - 1,
        });
    }

    /// Collect the bodies of all pending here-documents, patching each
    /// registered delimiter token with its body text.
    fn read_heredoc_bodies(&mut self) {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let mut body = String::new();
            loop {
                let mut line_text = String::new();
                let mut at_end = true;
                while let Some(c) = self.peek(0) {
                    self.advance();
                    if c == '\n' {
                        at_end = false;
                        break;
                    }
                    line_text.push(c);
                }
                let compare = if heredoc.strip_tabs {
                    line_text.trim_start_matches('\t').to_string()
                } else {
                    line_text.clone()
                };
                if compare == heredoc.delimiter {
                    break;
                }
                // Input exhausted with no delimiter line: stop
                if at_end && line_text.is_empty() {
                    break;
                }
                if heredoc.strip_tabs {
                    body.push_str(line_text.trim_start_matches('\t'));
                } else {
                    body.push_str(&line_text);
                }
                body.push('\n');
                if at_end {
                    break;
                }
            }
            self.tokens[heredoc.token_index].text = body;
        }
    }

    /// Read one word token, applying quoting rules. The returned token
    /// carries quote flags so the expansion layer can honor them.
    fn read_word(&mut self, start: usize, line: usize, column: usize) -> Token {
        let mut text = String::new();
        let mut quoted = false;
        let mut single_quoted = false;
        let mut had_unquoted = false;

        while let Some(c) = self.peek(0) {
            if is_word_boundary(c) {
                break;
            }
            match c {
                '\'' => {
                    quoted = true;
                    single_quoted = true;
                    self.advance();
                    while let Some(inner) = self.peek(0) {
                        if inner == '\'' {
                            self.advance();
                            break;
                        }
                        text.push(inner);
                        self.advance();
                    }
                }
                '"' => {
                    quoted = true;
                    self.advance();
                    self.read_double_quoted(&mut text);
                }
                '$' if self.peek(1) == Some('\'') => {
                    // ANSI-C quoting: $'...' with C-style escapes
                    quoted = true;
                    single_quoted = true;
                    self.advance();
                    self.advance();
                    while let Some(inner) = self.peek(0) {
                        if inner == '\'' {
                            self.advance();
                            break;
                        }
                        if inner == '\\' {
                            self.advance();
                            if let Some(esc) = self.advance() {
                                text.push(ansi_c_escape(esc));
                            }
                            continue;
                        }
                        text.push(inner);
                        self.advance();
                    }
                }
                '$' if self.peek(1) == Some('"') => {
                    // Locale quoting: $"..." processed like double quotes
                    quoted = true;
                    self.advance();
                    self.advance();
                    self.read_double_quoted(&mut text);
                }
                '$' if self.peek(1) == Some('(') => {
                    had_unquoted = true;
                    self.advance(); // $
                    text.push('$');
                    text.push_str(&self.capture_balanced('(', ')'));
                }
                '$' if self.peek(1) == Some('{') => {
                    had_unquoted = true;
                    self.advance();
                    text.push('$');
                    text.push_str(&self.capture_balanced('{', '}'));
                }
                '`' => {
                    had_unquoted = true;
                    self.advance();
                    text.push('`');
                    while let Some(inner) = self.peek(0) {
                        self.advance();
                        text.push(inner);
                        if inner == '`' {
                            break;
                        }
                    }
                }
                '\\' => {
                    self.advance();
                    match self.advance() {
                        // Line continuation inside a word
                        Some('\n') => {}
                        Some(escaped) => {
                            quoted = true;
                            text.push(escaped);
                        }
                        None => text.push('\\'),
                    }
                }
                '{' | '}' => {
                    // Brace-expansion text rides along inside the word
                    had_unquoted = true;
                    self.advance();
                    text.push(c);
                }
                _ => {
                    had_unquoted = true;
                    self.advance();
                    text.push(c);
                }
            }
        }

        // A word is single-quoted only when no unquoted part contributed
        let fully_single = single_quoted && !had_unquoted;

        // Reserved words: literal match on unquoted text only
        let kind = if !quoted {
            RESERVED_WORDS.get(text.as_str()).copied().unwrap_or(TokenKind::Word)
        } else {
            TokenKind::Word
        };

        let mut token = Token::new(kind, text, start, line, column);
        token.quoted = quoted;
        token.single_quoted = fully_single;
        token
    }

    /// Consume double-quoted content up to the closing quote, processing
    /// backslash escapes but leaving `$` alone for the expansion layer.
    fn read_double_quoted(&mut self, text: &mut String) {
        while let Some(inner) = self.peek(0) {
            if inner == '"' {
                self.advance();
                break;
            }
            if inner == '\\' {
                self.advance();
                match self.advance() {
                    Some(esc) => text.push(double_quote_escape(esc)),
                    None => text.push('\\'),
                }
                continue;
            }
            text.push(inner);
            self.advance();
        }
    }

    /// Capture a balanced bracketed run (including the brackets) into
    /// the current word text, tolerant of early end of input.
    fn capture_balanced(&mut self, open: char, close: char) -> String {
        let mut text = String::new();
        if let Some(c) = self.advance() {
            text.push(c);
        }
        let mut depth = 1;
        while depth > 0 {
            match self.advance() {
                Some(c) if c == open => {
                    depth += 1;
                    text.push(c);
                }
                Some(c) if c == close => {
                    depth -= 1;
                    text.push(c);
                }
                Some(c) => text.push(c),
                None => break,
            }
        }
        text
    }
}

/// Escape processing inside double quotes.
fn double_quote_escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'b' => '\u{0008}',
        'f' => '\u{000C}',
        'v' => '\u{000B}',
        '\\' | '"' | '\'' => c,
        // Unknown escapes keep the escaped character
        other => other,
    }
}

/// C-style escape processing inside $'...'.
fn ansi_c_escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'b' => '\u{0008}',
        'f' => '\u{000C}',
        'v' => '\u{000B}',
        '0' => '\0',
        'a' => '\u{0007}',
        'e' => '\u{001B}',
        '\\' | '\'' | '"' => c,
        other => other,
    }
}

/// Tokenize input text. Convenience wrapper over [`Lexer`].
pub fn tokenize(input: &str) -> Vec<Token> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_words() {
        let tokens = tokenize("echo hello world");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].text, "echo");
        assert_eq!(tokens[2].text, "world");
        assert_eq!(tokens[3].kind, TokenKind::Eof);
    }

    #[test]
    fn test_two_char_operators_greedy() {
        assert_eq!(
            kinds("a && b || c"),
            vec![
                TokenKind::Word,
                TokenKind::AndAnd,
                TokenKind::Word,
                TokenKind::OrOr,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("a >> f"),
            vec![TokenKind::Word, TokenKind::DGreat, TokenKind::Word, TokenKind::Eof]
        );
    }

    #[test]
    fn test_single_quotes_literal() {
        let tokens = tokenize("echo '$HOME $(x)'");
        assert_eq!(tokens[1].text, "$HOME $(x)");
        assert!(tokens[1].single_quoted);
    }

    #[test]
    fn test_double_quote_escapes() {
        let tokens = tokenize(r#"echo "a\tb\nc""#);
        assert_eq!(tokens[1].text, "a\tb\nc");
        assert!(tokens[1].quoted);
        assert!(!tokens[1].single_quoted);
    }

    #[test]
    fn test_ansi_c_quoting() {
        let tokens = tokenize(r"echo $'x\ty'");
        assert_eq!(tokens[1].text, "x\ty");
    }

    #[test]
    fn test_reserved_word_classification() {
        let tokens = tokenize("if true");
        assert_eq!(tokens[0].kind, TokenKind::If);
        // Quoted reserved words stay plain words
        let tokens = tokenize("'if' true");
        assert_eq!(tokens[0].kind, TokenKind::Word);
    }

    #[test]
    fn test_process_substitution_capture() {
        let tokens = tokenize("diff <(sort a) <(sort b)");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "<(sort a)");
        assert_eq!(tokens[2].text, "<(sort b)");
    }

    #[test]
    fn test_command_substitution_stays_in_word() {
        let tokens = tokenize("echo $(ls | wc -l)");
        assert_eq!(tokens[1].text, "$(ls | wc -l)");
        assert_eq!(tokens[2].kind, TokenKind::Eof);
    }

    #[test]
    fn test_fd_number_before_redirect() {
        let tokens = tokenize("cmd 2> err.log");
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].text, "2");
        assert_eq!(tokens[2].kind, TokenKind::Great);
    }

    #[test]
    fn test_plain_number_is_word() {
        let tokens = tokenize("echo 2 x");
        assert_eq!(tokens[1].kind, TokenKind::Word);
    }

    #[test]
    fn test_heredoc_body_collection() {
        let tokens = tokenize("cat << EOF\nline one\nline two\nEOF\n");
        assert_eq!(tokens[1].kind, TokenKind::DLess);
        assert_eq!(tokens[2].text, "line one\nline two\n");
    }

    #[test]
    fn test_heredoc_strip_tabs() {
        let tokens = tokenize("cat <<- EOF\n\tindented\n\tEOF\n");
        assert_eq!(tokens[1].kind, TokenKind::DLessDash);
        assert_eq!(tokens[2].text, "indented\n");
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            kinds("echo hi # trailing words\n"),
            vec![TokenKind::Word, TokenKind::Word, TokenKind::Newline, TokenKind::Eof]
        );
    }

    #[test]
    fn test_braces_and_subshell_grouping() {
        assert_eq!(
            kinds("( a; b )"),
            vec![
                TokenKind::LParen,
                TokenKind::Word,
                TokenKind::Semi,
                TokenKind::Word,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("{ a; }"),
            vec![
                TokenKind::LBrace,
                TokenKind::Word,
                TokenKind::Semi,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_brace_expansion_text_stays_in_word() {
        let tokens = tokenize("echo {a,b,c}");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "{a,b,c}");
    }

    #[test]
    fn test_never_fails_on_malformed_input() {
        // Unterminated quotes and stray operators still tokenize
        let tokens = tokenize("echo 'unterminated");
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        let tokens = tokenize("| | <<");
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_position_tracking() {
        let tokens = tokenize("a\nbb");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].column, 1);
    }
}
