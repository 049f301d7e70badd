//! Recursive-descent parser.
//!
//! Consumes the token stream with one token of lookahead and produces a
//! single AST root. Grammar precedence, lowest to highest:
//! command-list operators (`;`, `&`, `&&`, `||`) → pipeline (`|`) →
//! pipeline element (simple command | subshell | group | control
//! structure | function definition).
//!
//! Reserved words are classified by the lexer but only honored here in
//! command-starting position: `echo if` parses `if` as an argument word.
//! Parse errors are always raised to the caller; a broken AST is never
//! executed.

use thiserror::Error;

use crate::ast::types::{
    AstNode, CaseItem, CaseNode, CommandGroupNode, CommandListNode, ForNode,
    FunctionDefNode, IfNode, ListOperator, PipelineNode, RedirectKind, Redirection,
    SimpleCommandNode, SubshellNode, WhileNode, Word,
};
use crate::parser::lexer::{tokenize, Token, TokenKind};

/// Error produced when the token stream does not form a valid program.
#[derive(Debug, Clone, Error)]
#[error("parse error at {line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    fn at(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}

/// Parse input text into a single AST root.
pub fn parse(input: &str) -> Result<AstNode, ParseError> {
    Parser::new(tokenize(input)).parse_program()
}

/// Token kinds that end a command list without being consumed by it.
fn is_list_terminator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Eof
            | TokenKind::RParen
            | TokenKind::RBrace
            | TokenKind::Then
            | TokenKind::Do
            | TokenKind::Done
            | TokenKind::Fi
            | TokenKind::Else
            | TokenKind::Elif
            | TokenKind::Esac
            | TokenKind::DSemi
    )
}

/// Token kinds that can begin a redirection.
fn is_redirect_op(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Less
            | TokenKind::Great
            | TokenKind::DGreat
            | TokenKind::DLess
            | TokenKind::DLessDash
            | TokenKind::LessGreat
    )
}

/// Token kinds usable as word text in argument position. Reserved words
/// lose their special meaning once a command name has been seen.
fn is_wordlike(kind: TokenKind) -> bool {
    kind == TokenKind::Word || kind == TokenKind::Number || kind.is_reserved()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_ahead(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            let found = self.peek();
            Err(ParseError::at(
                format!("expected `{}`, found `{}`", kind.as_str(), found.kind.as_str()),
                found,
            ))
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind() == TokenKind::Newline {
            self.advance();
        }
    }

    /// Skip `;` and newlines (list separators inside control structures).
    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Semi) {
            self.advance();
        }
    }

    fn word_from(&self, token: Token) -> Word {
        Word {
            text: token.text,
            quoted: token.quoted,
            single_quoted: token.single_quoted,
        }
    }

    // =========================================================================
    // Entry point
    // =========================================================================

    /// Parse a whole program into one root node. Multiple lines chain
    /// into a `;` command list.
    pub fn parse_program(&mut self) -> Result<AstNode, ParseError> {
        self.skip_newlines();
        if self.peek_kind() == TokenKind::Eof {
            let token = self.peek().clone();
            return Err(ParseError::at("unexpected end of input", &token));
        }

        let root = self.parse_list()?;

        self.skip_newlines();
        if self.peek_kind() != TokenKind::Eof {
            let found = self.peek().clone();
            return Err(ParseError::at(
                format!("unexpected token `{}`", found.kind.as_str()),
                &found,
            ));
        }
        Ok(root)
    }

    // =========================================================================
    // Command lists
    // =========================================================================

    /// list: and_or ((`;` | `&` | newline) list?)?
    fn parse_list(&mut self) -> Result<AstNode, ParseError> {
        let left = self.parse_and_or()?;

        match self.peek_kind() {
            TokenKind::Semi | TokenKind::Newline => {
                self.skip_separators();
                if is_list_terminator(self.peek_kind()) {
                    return Ok(left);
                }
                let right = self.parse_list()?;
                Ok(AstNode::CommandList(CommandListNode {
                    left: Box::new(left),
                    operator: ListOperator::Semi,
                    right: Some(Box::new(right)),
                }))
            }
            TokenKind::Amp => {
                self.advance();
                self.skip_newlines();
                if is_list_terminator(self.peek_kind()) {
                    // Trailing `&`: background launch with no follow-up
                    return Ok(AstNode::CommandList(CommandListNode {
                        left: Box::new(left),
                        operator: ListOperator::Background,
                        right: None,
                    }));
                }
                let right = self.parse_list()?;
                Ok(AstNode::CommandList(CommandListNode {
                    left: Box::new(left),
                    operator: ListOperator::Background,
                    right: Some(Box::new(right)),
                }))
            }
            _ => Ok(left),
        }
    }

    /// and_or: pipeline ((`&&` | `||`) pipeline)*  — left associative.
    fn parse_and_or(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_pipeline()?;

        loop {
            let operator = match self.peek_kind() {
                TokenKind::AndAnd => ListOperator::And,
                TokenKind::OrOr => ListOperator::Or,
                _ => break,
            };
            self.advance();
            self.skip_newlines();
            let right = self.parse_pipeline()?;
            left = AstNode::CommandList(CommandListNode {
                left: Box::new(left),
                operator,
                right: Some(Box::new(right)),
            });
        }
        Ok(left)
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    /// pipeline: element (`|` element)*. A single element is returned
    /// bare; only multi-stage pipelines get a Pipeline node.
    fn parse_pipeline(&mut self) -> Result<AstNode, ParseError> {
        if self.peek_kind() == TokenKind::Pipe {
            let token = self.peek().clone();
            return Err(ParseError::at("syntax error near unexpected token `|`", &token));
        }

        let first = self.parse_element()?;
        if self.peek_kind() != TokenKind::Pipe {
            return Ok(first);
        }

        let mut commands = vec![first];
        while self.peek_kind() == TokenKind::Pipe {
            self.advance();
            self.skip_newlines();
            commands.push(self.parse_element()?);
        }
        Ok(AstNode::Pipeline(PipelineNode { commands }))
    }

    // =========================================================================
    // Pipeline elements
    // =========================================================================

    fn parse_element(&mut self) -> Result<AstNode, ParseError> {
        match self.peek_kind() {
            TokenKind::LParen => self.parse_subshell(),
            TokenKind::LBrace => self.parse_group(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(false),
            TokenKind::Until => self.parse_while(true),
            TokenKind::For => self.parse_for(),
            TokenKind::Case => self.parse_case(),
            TokenKind::Function => self.parse_function_keyword(),
            TokenKind::Word
                if self.peek_ahead(1) == TokenKind::LParen
                    && self.peek_ahead(2) == TokenKind::RParen =>
            {
                self.parse_function_shorthand()
            }
            TokenKind::Word | TokenKind::Number => self.parse_simple_command(),
            _ => {
                let found = self.peek().clone();
                Err(ParseError::at(
                    format!("unexpected token `{}`", found.kind.as_str()),
                    &found,
                ))
            }
        }
    }

    fn parse_subshell(&mut self) -> Result<AstNode, ParseError> {
        let open = self.expect(TokenKind::LParen)?;
        self.skip_separators();
        let command = self.parse_list()?;
        self.skip_separators();
        if self.peek_kind() != TokenKind::RParen {
            return Err(ParseError::at("unmatched `(`", &open));
        }
        self.advance();
        let redirections = self.parse_trailing_redirections()?;
        Ok(AstNode::Subshell(SubshellNode {
            command: Box::new(command),
            redirections,
        }))
    }

    fn parse_group(&mut self) -> Result<AstNode, ParseError> {
        let open = self.expect(TokenKind::LBrace)?;
        self.skip_separators();
        let command = self.parse_list()?;
        self.skip_separators();
        if self.peek_kind() != TokenKind::RBrace {
            return Err(ParseError::at("unmatched `{`", &open));
        }
        self.advance();
        let redirections = self.parse_trailing_redirections()?;
        Ok(AstNode::CommandGroup(CommandGroupNode {
            command: Box::new(command),
            redirections,
        }))
    }

    // =========================================================================
    // Control structures
    // =========================================================================

    /// if list; then list; [elif list; then list;]* [else list;] fi
    ///
    /// elif chains nest as nested If nodes in the else clause; the
    /// shared `fi` is consumed by the innermost call.
    fn parse_if(&mut self) -> Result<AstNode, ParseError> {
        let keyword = self.advance(); // `if` or `elif`
        self.skip_separators();
        let condition = self.parse_list()?;
        self.skip_separators();
        if self.peek_kind() == TokenKind::Eof {
            return Err(ParseError::at("unexpected end of input in `if`", &keyword));
        }
        self.expect(TokenKind::Then)?;
        self.skip_separators();
        let then_clause = self.parse_list()?;
        self.skip_separators();

        let else_clause = match self.peek_kind() {
            TokenKind::Elif => Some(Box::new(self.parse_if()?)),
            TokenKind::Else => {
                self.advance();
                self.skip_separators();
                let body = self.parse_list()?;
                self.skip_separators();
                self.expect(TokenKind::Fi)?;
                Some(Box::new(body))
            }
            TokenKind::Fi => {
                self.advance();
                None
            }
            _ => {
                let found = self.peek().clone();
                return Err(ParseError::at(
                    format!("expected `fi`, found `{}`", found.kind.as_str()),
                    &found,
                ));
            }
        };

        Ok(AstNode::If(IfNode {
            condition: Box::new(condition),
            then_clause: Box::new(then_clause),
            else_clause,
        }))
    }

    /// while list; do list; done (and `until`, which negates the test)
    fn parse_while(&mut self, until: bool) -> Result<AstNode, ParseError> {
        let keyword = self.advance();
        self.skip_separators();
        let condition = self.parse_list()?;
        self.skip_separators();
        if self.peek_kind() == TokenKind::Eof {
            return Err(ParseError::at(
                format!("unexpected end of input in `{}`", keyword.text),
                &keyword,
            ));
        }
        self.expect(TokenKind::Do)?;
        self.skip_separators();
        let body = self.parse_list()?;
        self.skip_separators();
        self.expect(TokenKind::Done)?;
        Ok(AstNode::While(WhileNode {
            condition: Box::new(condition),
            body: Box::new(body),
            until,
        }))
    }

    /// for NAME [in word...]; do list; done
    fn parse_for(&mut self) -> Result<AstNode, ParseError> {
        let keyword = self.advance();
        self.skip_newlines();
        if !is_wordlike(self.peek_kind()) {
            return Err(ParseError::at("expected variable name after `for`", &keyword));
        }
        let variable = self.advance().text;

        self.skip_newlines();
        let words = if self.peek_kind() == TokenKind::In {
            self.advance();
            let mut words = Vec::new();
            while is_wordlike(self.peek_kind()) {
                let token = self.advance();
                words.push(self.word_from(token));
            }
            Some(words)
        } else {
            None
        };

        self.skip_separators();
        if self.peek_kind() == TokenKind::Eof {
            return Err(ParseError::at("unexpected end of input in `for`", &keyword));
        }
        self.expect(TokenKind::Do)?;
        self.skip_separators();
        let body = self.parse_list()?;
        self.skip_separators();
        self.expect(TokenKind::Done)?;
        Ok(AstNode::For(ForNode {
            variable,
            words,
            body: Box::new(body),
        }))
    }

    /// case word in [(pattern[|pattern]) list ;;]* esac
    fn parse_case(&mut self) -> Result<AstNode, ParseError> {
        let keyword = self.advance();
        self.skip_newlines();
        if !is_wordlike(self.peek_kind()) {
            return Err(ParseError::at("expected word after `case`", &keyword));
        }
        let scrutinee = self.advance();
        let word = self.word_from(scrutinee);

        self.skip_newlines();
        self.expect(TokenKind::In)?;
        self.skip_separators();

        let mut items = Vec::new();
        while self.peek_kind() != TokenKind::Esac {
            if self.peek_kind() == TokenKind::Eof {
                return Err(ParseError::at("unexpected end of input in `case`", &keyword));
            }

            // Optional leading `(` before the pattern list
            if self.peek_kind() == TokenKind::LParen {
                self.advance();
            }

            let mut patterns = Vec::new();
            loop {
                if !is_wordlike(self.peek_kind()) {
                    let found = self.peek().clone();
                    return Err(ParseError::at("expected pattern in `case` item", &found));
                }
                let token = self.advance();
                patterns.push(self.word_from(token));
                if self.peek_kind() == TokenKind::Pipe {
                    self.advance();
                    continue;
                }
                break;
            }
            self.expect(TokenKind::RParen)?;
            self.skip_newlines();

            let command = if matches!(self.peek_kind(), TokenKind::DSemi | TokenKind::Esac) {
                None
            } else {
                Some(self.parse_list()?)
            };
            self.skip_separators();
            if self.peek_kind() == TokenKind::DSemi {
                self.advance();
            }
            self.skip_separators();

            items.push(CaseItem { patterns, command });
        }
        self.advance(); // esac

        Ok(AstNode::Case(CaseNode { word, items }))
    }

    // =========================================================================
    // Function definitions
    // =========================================================================

    /// function NAME [()] body
    fn parse_function_keyword(&mut self) -> Result<AstNode, ParseError> {
        let keyword = self.advance();
        if !is_wordlike(self.peek_kind()) {
            return Err(ParseError::at("expected function name", &keyword));
        }
        let name = self.advance().text;
        if self.peek_kind() == TokenKind::LParen && self.peek_ahead(1) == TokenKind::RParen {
            self.advance();
            self.advance();
        }
        self.skip_newlines();
        let body = self.parse_element()?;
        Ok(AstNode::FunctionDef(FunctionDefNode {
            name,
            body: Box::new(body),
        }))
    }

    /// NAME () body — function definition without the keyword form.
    fn parse_function_shorthand(&mut self) -> Result<AstNode, ParseError> {
        let name = self.advance().text;
        self.advance(); // (
        self.advance(); // )
        self.skip_newlines();
        let body = self.parse_element()?;
        Ok(AstNode::FunctionDef(FunctionDefNode {
            name,
            body: Box::new(body),
        }))
    }

    // =========================================================================
    // Simple commands & redirections
    // =========================================================================

    /// name arg... with redirections interleaved anywhere after the name.
    fn parse_simple_command(&mut self) -> Result<AstNode, ParseError> {
        let mut redirections = Vec::new();

        // Leading redirections are legal: `> out echo hi`
        while self.at_redirection() {
            redirections.push(self.parse_redirection()?);
        }

        if !is_wordlike(self.peek_kind()) {
            let found = self.peek().clone();
            return Err(ParseError::at("expected command name", &found));
        }
        let name_token = self.advance();
        let name = self.word_from(name_token);

        let mut args = Vec::new();
        loop {
            if self.at_redirection() {
                redirections.push(self.parse_redirection()?);
                continue;
            }
            if is_wordlike(self.peek_kind()) {
                let token = self.advance();
                args.push(self.word_from(token));
                continue;
            }
            break;
        }

        Ok(AstNode::SimpleCommand(SimpleCommandNode {
            name,
            args,
            redirections,
        }))
    }

    /// True when the next tokens start a redirection (`> f`, `2> f`).
    fn at_redirection(&self) -> bool {
        if is_redirect_op(self.peek_kind()) {
            return true;
        }
        self.peek_kind() == TokenKind::Number && is_redirect_op(self.peek_ahead(1))
    }

    fn parse_redirection(&mut self) -> Result<Redirection, ParseError> {
        let fd = if self.peek_kind() == TokenKind::Number {
            let token = self.advance();
            token.text.parse::<u32>().ok()
        } else {
            None
        };

        let op = self.advance();
        let kind = match op.kind {
            TokenKind::Less => RedirectKind::Input,
            TokenKind::Great => RedirectKind::Output,
            TokenKind::DGreat => RedirectKind::Append,
            TokenKind::DLess => RedirectKind::Heredoc,
            TokenKind::DLessDash => RedirectKind::HeredocStripTabs,
            TokenKind::LessGreat => RedirectKind::ReadWrite,
            _ => {
                return Err(ParseError::at(
                    format!("unexpected token `{}`", op.kind.as_str()),
                    &op,
                ))
            }
        };

        if !is_wordlike(self.peek_kind()) {
            return Err(ParseError::at(
                format!("expected redirection target after `{}`", op.kind.as_str()),
                &op,
            ));
        }
        let target_token = self.advance();
        let target = self.word_from(target_token);

        Ok(Redirection { kind, fd, target })
    }

    /// Redirections after a subshell or group: `( ... ) > out`.
    fn parse_trailing_redirections(&mut self) -> Result<Vec<Redirection>, ParseError> {
        let mut redirections = Vec::new();
        while self.at_redirection() {
            redirections.push(self.parse_redirection()?);
        }
        Ok(redirections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> AstNode {
        match parse(input) {
            Ok(node) => node,
            Err(e) => panic!("parse failed for {:?}: {}", input, e),
        }
    }

    #[test]
    fn test_simple_command() {
        let node = parse_ok("echo hello world");
        match node {
            AstNode::SimpleCommand(cmd) => {
                assert_eq!(cmd.name.text, "echo");
                assert_eq!(cmd.args.len(), 2);
                assert_eq!(cmd.args[1].text, "world");
            }
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_two_stages() {
        match parse_ok("ls | grep x") {
            AstNode::Pipeline(p) => {
                assert_eq!(p.commands.len(), 2);
                match &p.commands[0] {
                    AstNode::SimpleCommand(c) => assert_eq!(c.name.text, "ls"),
                    other => panic!("unexpected stage {:?}", other),
                }
            }
            other => panic!("expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_four_stages_in_order() {
        match parse_ok("a|b|c|d") {
            AstNode::Pipeline(p) => {
                let names: Vec<_> = p
                    .commands
                    .iter()
                    .map(|c| match c {
                        AstNode::SimpleCommand(s) => s.name.text.clone(),
                        other => panic!("unexpected stage {:?}", other),
                    })
                    .collect();
                assert_eq!(names, vec!["a", "b", "c", "d"]);
            }
            other => panic!("expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_list_precedence_semi_lowest() {
        // a && b || c; d  →  Semi at the root, and/or chain on the left
        match parse_ok("a && b || c; d") {
            AstNode::CommandList(list) => {
                assert_eq!(list.operator, ListOperator::Semi);
                match list.left.as_ref() {
                    AstNode::CommandList(or_list) => {
                        assert_eq!(or_list.operator, ListOperator::Or);
                        match or_list.left.as_ref() {
                            AstNode::CommandList(and_list) => {
                                assert_eq!(and_list.operator, ListOperator::And);
                            }
                            other => panic!("expected && list, got {:?}", other),
                        }
                    }
                    other => panic!("expected || list, got {:?}", other),
                }
                assert!(list.right.is_some());
            }
            other => panic!("expected command list, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_background() {
        match parse_ok("sleep 10 &") {
            AstNode::CommandList(list) => {
                assert_eq!(list.operator, ListOperator::Background);
                assert!(list.right.is_none());
            }
            other => panic!("expected background list, got {:?}", other),
        }
    }

    #[test]
    fn test_background_with_follow_up() {
        match parse_ok("sleep 10 & echo hi") {
            AstNode::CommandList(list) => {
                assert_eq!(list.operator, ListOperator::Background);
                assert!(list.right.is_some());
            }
            other => panic!("expected background list, got {:?}", other),
        }
    }

    #[test]
    fn test_subshell_and_group() {
        match parse_ok("(cd /tmp; pwd)") {
            AstNode::Subshell(_) => {}
            other => panic!("expected subshell, got {:?}", other),
        }
        match parse_ok("{ cd /tmp; pwd; }") {
            AstNode::CommandGroup(_) => {}
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else() {
        match parse_ok("if true; then echo a; else echo b; fi") {
            AstNode::If(node) => {
                assert!(node.else_clause.is_some());
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_elif_nests() {
        match parse_ok("if a; then b; elif c; then d; else e; fi") {
            AstNode::If(node) => match node.else_clause.as_deref() {
                Some(AstNode::If(inner)) => assert!(inner.else_clause.is_some()),
                other => panic!("expected nested if, got {:?}", other),
            },
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_while_and_until() {
        match parse_ok("while true; do echo x; done") {
            AstNode::While(node) => assert!(!node.until),
            other => panic!("expected while, got {:?}", other),
        }
        match parse_ok("until false; do echo x; done") {
            AstNode::While(node) => assert!(node.until),
            other => panic!("expected while, got {:?}", other),
        }
    }

    #[test]
    fn test_for_with_words() {
        match parse_ok("for x in a b c; do echo $x; done") {
            AstNode::For(node) => {
                assert_eq!(node.variable, "x");
                let words = node.words.expect("word list");
                assert_eq!(words.len(), 3);
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_for_without_words_uses_positionals() {
        match parse_ok("for x; do echo $x; done") {
            AstNode::For(node) => assert!(node.words.is_none()),
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_case_statement() {
        match parse_ok("case $x in a) echo one ;; *) echo other ;; esac") {
            AstNode::Case(node) => {
                assert_eq!(node.items.len(), 2);
                assert_eq!(node.items[0].patterns[0].text, "a");
                assert_eq!(node.items[1].patterns[0].text, "*");
            }
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn test_case_multiple_patterns() {
        match parse_ok("case $x in a|b) echo ab ;; esac") {
            AstNode::Case(node) => assert_eq!(node.items[0].patterns.len(), 2),
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn test_function_shorthand() {
        match parse_ok("greet() { echo hi; }") {
            AstNode::FunctionDef(def) => assert_eq!(def.name, "greet"),
            other => panic!("expected function def, got {:?}", other),
        }
    }

    #[test]
    fn test_function_keyword_form() {
        match parse_ok("function greet { echo hi; }") {
            AstNode::FunctionDef(def) => assert_eq!(def.name, "greet"),
            other => panic!("expected function def, got {:?}", other),
        }
    }

    #[test]
    fn test_redirections_extracted() {
        match parse_ok("echo hi > out.txt 2> err.txt") {
            AstNode::SimpleCommand(cmd) => {
                assert_eq!(cmd.args.len(), 1);
                assert_eq!(cmd.redirections.len(), 2);
                assert_eq!(cmd.redirections[0].kind, RedirectKind::Output);
                assert_eq!(cmd.redirections[0].effective_fd(), 1);
                assert_eq!(cmd.redirections[1].effective_fd(), 2);
            }
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn test_redirection_interleaved_with_args() {
        match parse_ok("echo > out.txt hi") {
            AstNode::SimpleCommand(cmd) => {
                assert_eq!(cmd.args.len(), 1);
                assert_eq!(cmd.args[0].text, "hi");
                assert_eq!(cmd.redirections.len(), 1);
            }
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn test_heredoc_redirection() {
        match parse_ok("cat << EOF\nbody line\nEOF\n") {
            AstNode::SimpleCommand(cmd) => {
                assert_eq!(cmd.redirections.len(), 1);
                assert_eq!(cmd.redirections[0].kind, RedirectKind::Heredoc);
                assert_eq!(cmd.redirections[0].target.text, "body line\n");
            }
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn test_reserved_word_as_argument() {
        match parse_ok("echo if then done") {
            AstNode::SimpleCommand(cmd) => {
                let args: Vec<_> = cmd.args.iter().map(|w| w.text.as_str()).collect();
                assert_eq!(args, vec!["if", "then", "done"]);
            }
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn test_multiline_script_chains() {
        match parse_ok("echo a\necho b\n") {
            AstNode::CommandList(list) => assert_eq!(list.operator, ListOperator::Semi),
            other => panic!("expected command list, got {:?}", other),
        }
    }

    #[test]
    fn test_error_pipe_at_start() {
        assert!(parse("| grep x").is_err());
    }

    #[test]
    fn test_error_unmatched_paren() {
        assert!(parse("(echo hi").is_err());
    }

    #[test]
    fn test_error_unmatched_brace() {
        assert!(parse("{ echo hi").is_err());
    }

    #[test]
    fn test_error_unterminated_if() {
        assert!(parse("if true; then echo hi").is_err());
    }

    #[test]
    fn test_error_empty_input() {
        assert!(parse("").is_err());
        assert!(parse("\n\n").is_err());
    }
}
