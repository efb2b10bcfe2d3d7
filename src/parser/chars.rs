/// Character classification for the lexer.

/// Whitespace recognized between tokens.
pub fn is_whitespace(ch: char) -> bool {
    matches!(
        ch,
        ' ' | '\u{00a0}' | '\n' | '\r' | '\t' | '\u{000c}' | '\u{000b}' | '\u{200b}' | '\u{180e}'
            | '\u{2000}'..='\u{200a}' | '\u{202f}' | '\u{205f}' | '\u{3000}'
    )
}

pub fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

/// Letters: anything that may start a Unicode identifier.
pub fn is_letter(ch: char) -> bool {
    unicode_ident::is_xid_start(ch)
}

pub fn is_alphanumeric(ch: char) -> bool {
    ch.is_ascii_digit() || is_letter(ch)
}

pub fn is_identifier_start(ch: char) -> bool {
    ch == '$' || ch == '_' || is_letter(ch)
}

/// Identifier parts: letters, combining marks, decimal digits, connector
/// punctuation, `$`, ZWNJ and ZWJ.
pub fn is_identifier_char(ch: char) -> bool {
    ch == '$' || ch == '\u{200c}' || ch == '\u{200d}' || unicode_ident::is_xid_continue(ch)
}

pub fn is_operator_char(ch: char) -> bool {
    "+-*&%=<>!?|~^".contains(ch)
}

pub fn is_punctuation(ch: char) -> bool {
    "[]{}(),;:".contains(ch)
}

/// Keywords, including the word operators.
pub const KEYWORDS: &[&str] = &[
    "break", "case", "catch", "const", "continue", "debugger", "default", "delete", "do", "else",
    "finally", "for", "function", "if", "in", "instanceof", "new", "return", "switch", "throw",
    "try", "typeof", "var", "void", "while", "with",
];

pub const ATOMS: &[&str] = &["false", "null", "true", "undefined"];

/// Keywords after which a `/` starts a regular expression.
pub const KEYWORDS_BEFORE_EXPRESSION: &[&str] = &["return", "new", "delete", "throw", "else", "case"];

pub const OPERATORS: &[&str] = &[
    "in", "instanceof", "typeof", "new", "void", "delete", "++", "--", "+", "-", "!", "~", "&",
    "|", "^", "*", "/", "%", ">>", "<<", ">>>", "<", ">", "<=", ">=", "==", "===", "!=", "!==",
    "?", "=", "+=", "-=", "/=", "*=", "%=", ">>=", "<<=", ">>>=", "|=", "^=", "&=", "&&", "||",
];

/// Look up the static spelling of a keyword
pub fn keyword(word: &str) -> Option<&'static str> {
    KEYWORDS.iter().copied().find(|k| *k == word)
}

pub fn atom(word: &str) -> Option<&'static str> {
    ATOMS.iter().copied().find(|a| *a == word)
}

pub fn operator(text: &str) -> Option<&'static str> {
    OPERATORS.iter().copied().find(|op| *op == text)
}

/// Template commands that may follow `{{`
pub const START_COMMANDS: &[&str] = &["each", "if", "else", "tmpl", "verbatim", "html", "layout", "var", "!"];

/// Template commands that may follow `{{/`
pub const END_COMMANDS: &[&str] = &["each", "if", "verbatim"];

/// Longest command lookahead, in characters
const COMMAND_LOOKAHEAD: usize = 20;

/// A recognized `{{cmd` or `{{/cmd` marker at the start of `text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMarker {
    pub closing: bool,
    pub name: &'static str,
}

/// Match `{{`, an optional `/`, a command name and one of ` `, `}` or `(`.
pub fn command_at(text: &str) -> Option<CommandMarker> {
    let rest = text.strip_prefix("{{")?;
    let (closing, rest) = match rest.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let budget = COMMAND_LOOKAHEAD - if closing { 3 } else { 2 };
    let name_len = rest
        .chars()
        .take(budget)
        .take_while(|c| c.is_ascii_lowercase() || *c == '!')
        .count();
    if name_len == 0 || name_len >= budget {
        return None;
    }
    let name = &rest[..name_len];
    let follower = rest[name_len..].chars().next()?;
    if !matches!(follower, ' ' | '}' | '(') {
        return None;
    }
    let table = if closing { END_COMMANDS } else { START_COMMANDS };
    let name = table.iter().copied().find(|c| *c == name)?;
    Some(CommandMarker { closing, name })
}

/// Whether `text` starts with `${` or a recognized command marker.
pub fn marker_at(text: &str) -> bool {
    text.starts_with("${") || command_at(text).is_some()
}

/// Whether `word` can be printed as a bare identifier
pub fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => chars.all(is_identifier_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_markers() {
        assert_eq!(command_at("{{each items}}"), Some(CommandMarker { closing: false, name: "each" }));
        assert_eq!(command_at("{{/if}}"), Some(CommandMarker { closing: true, name: "if" }));
        assert_eq!(command_at("{{tmpl(x) 'a'}}"), Some(CommandMarker { closing: false, name: "tmpl" }));
        assert_eq!(command_at("{{! note }}"), Some(CommandMarker { closing: false, name: "!" }));
        assert_eq!(command_at("{{/tmpl}}"), None);
        assert_eq!(command_at("{{unknown}}"), None);
        assert_eq!(command_at("{{each"), None);
        assert_eq!(command_at("{{!-- x --}}"), None);
        assert_eq!(command_at("{{{if x}}"), None);
    }

    #[test]
    fn test_markers() {
        assert!(marker_at("${x}"));
        assert!(marker_at("{{if x}}"));
        assert!(!marker_at("{ {if x}}"));
        assert!(!marker_at("$x"));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("$index"));
        assert!(is_identifier("_x1"));
        assert!(is_identifier("café"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(is_identifier_char('\u{0301}'));
        assert!(is_identifier("a\u{0dca}"));
        assert!(is_identifier("x\u{203f}y"));
        assert!(is_identifier("n\u{0663}"));
        assert!(is_identifier_char('\u{200d}'));
        assert!(!is_identifier_start('\u{0dca}'));
        assert!(is_whitespace('\u{3000}'));
    }
}
