//! The xbnf definition-language parser: a hand-written recursive descent
//! over the character stream, one function per construct. Errors are
//! plain messages here; [`Grammar`] wraps them with rule name and line.

use crate::grammar::Grammar;
use crate::rule::Rule;
use crate::rule::RuleKind;
use crate::stream::is_whitespace;
use crate::stream::CharStream;

type ParseResult<T> = Result<T, String>;

/// Checks a declared rule name: a letter first, then letters, digits or
/// underscores. `EOF` is reserved for the built-in rule.
pub(crate) fn validate_rule_name(name: &str) -> ParseResult<()> {
    let mut chars = name.chars();
    let first = match chars.next() {
        None => return Err("empty rule name".to_string()),
        Some(first) => first,
    };
    if !first.is_ascii_alphabetic() {
        return Err(format!(
            "rule name must start with a letter character: '{first}' is invalid"
        ));
    }
    if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(format!(
            "rule name must consist of letters, 0-9 digits, or '_': '{name}' is invalid"
        ));
    }
    if name == "EOF" {
        return Err("'EOF' is reserved for the built-in rule".to_string());
    }
    Ok(())
}

fn is_reference_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn take_flags(mut rule: Rule, virtual_: &mut bool, non_data: &mut bool) -> Rule {
    rule.set_virtual(*virtual_);
    *virtual_ = false;
    rule.set_non_data(*non_data);
    *non_data = false;
    rule
}

impl Grammar {
    /// Parses a rule body up to (not including) one of the terminator
    /// codepoints. Juxtaposed atoms concatenate; `|`/`>` fold the
    /// preceding atom into a choice; `//` starts a comment that ends the
    /// body.
    pub(crate) fn parse_body(
        &mut self,
        name: &str,
        cs: &mut dyn CharStream,
        terminators: &[char],
    ) -> ParseResult<Rule> {
        let mut rules: Vec<Rule> = Vec::new();
        let mut virtual_ = false;
        let mut non_data = false;
        cs.skip_spaces();
        loop {
            let ch = match cs.peek() {
                None => break,
                Some(ch) => ch,
            };
            if terminators.contains(&ch) {
                break;
            }
            if is_whitespace(ch) {
                cs.next();
                continue;
            }
            match ch {
                '~' | '#' => {
                    if ch == '~' {
                        virtual_ = true;
                    } else {
                        non_data = true;
                    }
                    cs.next();
                    // annotations bind to an atom, never to an alternate list
                    if cs.peek() == Some('|') {
                        return Err(format!(
                            "annotation symbol '{ch}' can not appear before choice symbol '|'"
                        ));
                    }
                }
                '\'' => {
                    let rule = in_char(cs)?;
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                '\\' => {
                    let rule = in_unicode(cs)?;
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                '"' => {
                    let rule = in_string(cs)?;
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                '|' | '>' => {
                    let first = match rules.pop() {
                        None => return Err("choice operator must be in between rules".to_string()),
                        Some(first) => first,
                    };
                    let rule = self.in_choice(name, first, cs)?;
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                '[' => {
                    let rule = self.in_option(name, cs)?;
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                '{' => {
                    let rule = self.in_repetition(name, cs)?;
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                '<' => {
                    let rule = self.in_block(name, cs)?;
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                '(' => {
                    let rule = self.in_group(name, cs)?;
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                '/' => {
                    cs.next();
                    if cs.next() != Some('/') {
                        return Err("invalid char '/'".to_string());
                    }
                    while let Some(ch) = cs.next() {
                        if ch == '\n' {
                            break;
                        }
                    }
                    break;
                }
                ch if is_reference_start(ch) => {
                    let rule = self.in_reference(name, cs);
                    rules.push(take_flags(rule, &mut virtual_, &mut non_data));
                }
                ch => return Err(format!("invalid char '{ch}'")),
            }
        }
        match rules.len() {
            0 => Err("no rule found".to_string()),
            1 => Ok(rules.remove(0)),
            _ => Ok(Rule::new(RuleKind::Concatenate { rules })),
        }
    }

    /// Parses exactly one atom, leaving whatever follows in the stream.
    /// Alternates of a choice are collected through here.
    fn parse_one(&mut self, name: &str, cs: &mut dyn CharStream) -> ParseResult<Rule> {
        let mut virtual_ = false;
        let mut non_data = false;
        loop {
            let ch = match cs.peek() {
                None => return Err("EOF encountered, no more rule".to_string()),
                Some(ch) => ch,
            };
            match ch {
                ' ' | '\n' | '\t' | '\r' => {
                    cs.next();
                }
                '~' | '#' => {
                    if ch == '~' {
                        virtual_ = true;
                    } else {
                        non_data = true;
                    }
                    cs.next();
                    if cs.peek() == Some('|') {
                        return Err(format!(
                            "annotation symbol '{ch}' can not appear before choice symbol '|'"
                        ));
                    }
                }
                '\'' => return Ok(take_flags(in_char(cs)?, &mut virtual_, &mut non_data)),
                '\\' => return Ok(take_flags(in_unicode(cs)?, &mut virtual_, &mut non_data)),
                '"' => return Ok(take_flags(in_string(cs)?, &mut virtual_, &mut non_data)),
                '[' => {
                    return Ok(take_flags(
                        self.in_option(name, cs)?,
                        &mut virtual_,
                        &mut non_data,
                    ))
                }
                '(' => {
                    return Ok(take_flags(
                        self.in_group(name, cs)?,
                        &mut virtual_,
                        &mut non_data,
                    ))
                }
                '{' => {
                    return Ok(take_flags(
                        self.in_repetition(name, cs)?,
                        &mut virtual_,
                        &mut non_data,
                    ))
                }
                '<' => {
                    return Ok(take_flags(
                        self.in_block(name, cs)?,
                        &mut virtual_,
                        &mut non_data,
                    ))
                }
                ch if is_reference_start(ch) => {
                    return Ok(take_flags(
                        self.in_reference(name, cs),
                        &mut virtual_,
                        &mut non_data,
                    ))
                }
                ch => return Err(format!("invalid char '{ch}' for any rule")),
            }
        }
    }

    /// Called with the stream just before a `|` or `>`. Collects the
    /// remaining alternates; `>` closes the current priority group.
    fn in_choice(&mut self, name: &str, first: Rule, cs: &mut dyn CharStream) -> ParseResult<Rule> {
        let mut groups: Vec<Vec<Rule>> = Vec::new();
        let mut rules: Vec<Rule> = vec![first];
        loop {
            match cs.peek() {
                Some(' ') => {
                    cs.next();
                }
                Some('|') => {
                    cs.next();
                    rules.push(self.parse_one(name, cs)?);
                }
                Some('>') => {
                    groups.push(std::mem::take(&mut rules));
                    cs.next();
                    rules.push(self.parse_one(name, cs)?);
                }
                _ => break,
            }
        }
        groups.push(rules);
        if groups.len() == 1 && groups[0].len() < 2 {
            return Err("choice rule must have at least 2 rules as choices".to_string());
        }
        Ok(Rule::new(RuleKind::Choice { groups }))
    }

    fn in_group(&mut self, name: &str, cs: &mut dyn CharStream) -> ParseResult<Rule> {
        if cs.next() != Some('(') {
            return Err("group must start with a round bracket '('".to_string());
        }
        let rule = self.parse_body(name, cs, &[')'])?;
        if cs.next() != Some(')') {
            return Err("group must end with a round bracket ')'".to_string());
        }
        Ok(Rule::new(RuleKind::Group {
            rule: Box::new(rule),
        }))
    }

    fn in_option(&mut self, name: &str, cs: &mut dyn CharStream) -> ParseResult<Rule> {
        if cs.next() != Some('[') {
            return Err("option must start with a square bracket '['".to_string());
        }
        let rule = self.parse_body(name, cs, &[']'])?;
        if cs.next() != Some(']') {
            return Err("option must end with a square bracket ']'".to_string());
        }
        Ok(Rule::new(RuleKind::Option {
            rule: Box::new(rule),
        }))
    }

    fn in_repetition(&mut self, name: &str, cs: &mut dyn CharStream) -> ParseResult<Rule> {
        if cs.next() != Some('{') {
            return Err("repetition must start with curly brace '{'".to_string());
        }
        let rule = self.parse_body(name, cs, &['}'])?;
        if cs.next() != Some('}') {
            return Err("repetition must end with curly brace '}'".to_string());
        }
        let (min, max) = match cs.peek() {
            Some('*') => {
                cs.next();
                (0, 0)
            }
            Some('+') => {
                cs.next();
                (1, 0)
            }
            Some('<') => in_repeat_spec(cs)?,
            _ => (0, 0),
        };
        Ok(Rule::new(RuleKind::Repetition {
            rule: Box::new(rule),
            min,
            max,
        }))
    }

    /// `<open [escape] [^exclude]* close [!]>`; the `!` marks a virtual
    /// close whose chars return to the stream after matching.
    fn in_block(&mut self, name: &str, cs: &mut dyn CharStream) -> ParseResult<Rule> {
        if cs.next() != Some('<') {
            return Err("block must start with '<' char".to_string());
        }
        let open = self
            .parse_body(name, cs, &[' ', '>', '!'])
            .map_err(|e| format!("missing block open rule: {e}"))?;

        // the second slot is either the escape rule or already the close
        let mut escape: Option<Rule> = None;
        cs.skip_spaces();
        if cs.peek() != Some('^') {
            let rule = self.parse_body(name, cs, &[' ', '>', '!'])?;
            cs.skip_spaces();
            if let Some(peek @ ('>' | '!')) = cs.peek() {
                cs.next();
                let mut virtual_close = false;
                if peek == '!' {
                    cs.skip_spaces();
                    match cs.next() {
                        Some('>') => {}
                        other => return Err(block_close_error(other)),
                    }
                    virtual_close = true;
                }
                return Ok(Rule::new(RuleKind::Block {
                    open: Box::new(open),
                    escape: None,
                    excludes: Vec::new(),
                    close: Box::new(rule),
                    virtual_close,
                }));
            }
            escape = Some(rule);
        }

        let mut excludes: Vec<Rule> = Vec::new();
        loop {
            cs.skip_spaces();
            if cs.peek() != Some('^') {
                break;
            }
            cs.next();
            excludes.push(self.parse_body(name, cs, &[' ', '>', '!'])?);
        }

        let close = self.parse_body(name, cs, &['>', '!'])?;
        let mut virtual_close = false;
        let mut closer = cs.next();
        if closer == Some('!') {
            virtual_close = true;
            cs.skip_spaces();
            closer = cs.next();
        }
        if closer != Some('>') {
            return Err(block_close_error(closer));
        }
        Ok(Rule::new(RuleKind::Block {
            open: Box::new(open),
            escape: escape.map(Box::new),
            excludes,
            close: Box::new(close),
            virtual_close,
        }))
    }

    /// A bare identifier. `EOF` resolves to the built-in rule; anything
    /// else becomes a by-name reference and is recorded in the usage
    /// graph for validation.
    fn in_reference(&mut self, name: &str, cs: &mut dyn CharStream) -> Rule {
        let mut target = String::new();
        cs.skip_spaces();
        // caller guaranteed a valid first char
        if let Some(first) = cs.next() {
            target.push(first);
        }
        while let Some(ch) = cs.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                target.push(ch);
                cs.next();
                continue;
            }
            break;
        }
        if target == "EOF" {
            return Rule::eof();
        }
        self.add_usage(&target, name);
        Rule::new(RuleKind::Reference { target })
    }
}

fn block_close_error(found: Option<char>) -> String {
    match found {
        Some(ch) => format!("block must end with a '>': encountered '{ch}'"),
        None => "block must end with a '>': encountered EOF".to_string(),
    }
}

/// Single-quoted literal: one codepoint makes a Char (or, with a `-`
/// following, the start of a Range), several make a Chars run.
/// Backslash escapes the next codepoint; `\uXXXX` is a Unicode escape.
fn in_char(cs: &mut dyn CharStream) -> ParseResult<Rule> {
    if cs.next() != Some('\'') {
        return Err("terminal char must start with a single quote".to_string());
    }
    let mut buf: Vec<char> = Vec::new();
    let mut any_unicode = false;
    loop {
        let mut ch = match cs.next() {
            None => return Err("terminal char must end with a single quote".to_string()),
            Some(ch) => ch,
        };
        if ch == '\'' {
            break;
        }
        if ch == '\\' {
            if cs.peek() == Some('u') {
                ch = parse_unicode_escape(cs)?;
                any_unicode = true;
            } else {
                ch = cs
                    .next()
                    .ok_or_else(|| "terminal char must end with a single quote".to_string())?;
            }
        }
        buf.push(ch);
    }
    match buf.len() {
        0 => Err("terminal char(s) must contain at least 1 character".to_string()),
        1 => {
            if cs.peek() == Some('-') {
                return in_range(cs, buf[0], any_unicode);
            }
            Ok(Rule::new(RuleKind::Char {
                ch: buf[0],
                unicode: any_unicode,
            }))
        }
        _ => Ok(Rule::new(RuleKind::Chars { text: buf })),
    }
}

/// A bare `\uXXXX` terminal, or the start of a range when a `-` follows.
fn in_unicode(cs: &mut dyn CharStream) -> ParseResult<Rule> {
    if cs.next() != Some('\\') || cs.peek() != Some('u') {
        return Err(
            "unicode terminal must start with '\\u' and followed with 4 hex chars".to_string(),
        );
    }
    let ch = parse_unicode_escape(cs)?;
    if cs.peek() == Some('-') {
        return in_range(cs, ch, true);
    }
    Ok(Rule::new(RuleKind::Char { ch, unicode: true }))
}

/// Double-quoted string terminal, with the same escape conventions as
/// char literals.
fn in_string(cs: &mut dyn CharStream) -> ParseResult<Rule> {
    if cs.next() != Some('"') {
        return Err("terminal string must start with a double quote".to_string());
    }
    let mut buf: Vec<char> = Vec::new();
    loop {
        let mut ch = match cs.next() {
            None => return Err("terminal string must end with a double quote".to_string()),
            Some(ch) => ch,
        };
        if ch == '"' {
            break;
        }
        if ch == '\\' {
            if cs.peek() == Some('u') {
                ch = parse_unicode_escape(cs)?;
            } else {
                ch = cs
                    .next()
                    .ok_or_else(|| "terminal string must end with a double quote".to_string())?;
            }
        }
        buf.push(ch);
    }
    Ok(Rule::new(RuleKind::String { text: buf }))
}

/// The `-'z'` / `-Z` tail of a range whose begin codepoint was just
/// parsed.
fn in_range(cs: &mut dyn CharStream, begin: char, begin_unicode: bool) -> ParseResult<Rule> {
    if cs.next() != Some('-') {
        return Err("char range must be 2 chars connected by a range symbol '-'".to_string());
    }
    let mut end_unicode = false;
    let end = match cs.next() {
        Some('\'') => {
            let mut end = match cs.next() {
                None => {
                    return Err(
                        "char range must be 2 chars connected by a range symbol '-'".to_string()
                    )
                }
                Some(ch) => ch,
            };
            if end == '\\' {
                if cs.peek() != Some('u') {
                    return Err("char range: end char missing unicode escape \\u".to_string());
                }
                end = parse_unicode_escape(cs)?;
                end_unicode = true;
            }
            if cs.next() != Some('\'') {
                return Err(
                    "char range must be 2 chars connected by a range symbol '-'".to_string()
                );
            }
            end
        }
        Some('\\') => {
            end_unicode = true;
            parse_unicode_escape(cs)?
        }
        _ => {
            return Err(
                "char range must be 2 chars connected by a range symbol '-': invalid 2nd char"
                    .to_string(),
            )
        }
    };
    if begin > end {
        return Err(format!(
            "invalid char range: begin '{begin}' greater than end '{end}'"
        ));
    }
    Ok(Rule::new(RuleKind::Range {
        begin,
        begin_unicode,
        end,
        end_unicode,
    }))
}

/// `uXXXX` with exactly 4 hex digits; the leading backslash is already
/// consumed.
fn parse_unicode_escape(cs: &mut dyn CharStream) -> ParseResult<char> {
    if cs.peek() != Some('u') {
        return Err("unicode escape must start with '\\u'".to_string());
    }
    cs.next();
    let mut hex = String::with_capacity(4);
    for _ in 0..4 {
        match cs.next() {
            Some(ch) if ch.is_ascii_hexdigit() => hex.push(ch),
            _ => {
                return Err(
                    "unicode escape must start with '\\u' and followed with 4 hex chars"
                        .to_string(),
                )
            }
        }
    }
    let code = u32::from_str_radix(&hex, 16).map_err(|_| format!("invalid unicode hex value: {hex}"))?;
    char::from_u32(code).ok_or_else(|| format!("invalid unicode hex value: {hex}"))
}

/// `<min,max>` repetition bounds: `<n>` pins both, a trailing comma
/// leaves max unbounded, blanks default to 0.
fn in_repeat_spec(cs: &mut dyn CharStream) -> ParseResult<(u32, u32)> {
    if cs.next() != Some('<') {
        return Err("repetition specification must start with a '<'".to_string());
    }
    cs.skip_spaces();
    let mut digits = String::new();
    let mut has_comma = true;
    loop {
        match cs.next() {
            Some(' ') | Some('\t') | Some('\n') => continue,
            Some(',') => break,
            Some('>') => {
                has_comma = false;
                break;
            }
            Some(ch) if ch.is_ascii_digit() => digits.push(ch),
            Some(ch) => return Err(format!("invalid char in repetition specification: {ch}")),
            None => return Err("repetition specification must end with a '>'".to_string()),
        }
    }
    let min = parse_bound(&digits)?;
    let max = if has_comma {
        digits.clear();
        loop {
            match cs.next() {
                Some(' ') | Some('\t') | Some('\n') => continue,
                Some('>') => break,
                Some(ch) if ch.is_ascii_digit() => digits.push(ch),
                Some(ch) => return Err(format!("invalid char in repetition specification: {ch}")),
                None => return Err("repetition specification must end with a '>'".to_string()),
            }
        }
        parse_bound(&digits)?
    } else {
        // `<n>` means exactly n
        min
    };
    if max != 0 && max < min {
        return Err(format!(
            "invalid repetition specification: max repeat less than min repeat: <{min},{max}>"
        ));
    }
    Ok((min, max))
}

fn parse_bound(digits: &str) -> ParseResult<u32> {
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse::<u32>()
        .map_err(|_| format!("invalid repetition specification: {digits}"))
}
