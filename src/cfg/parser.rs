//! Parser for the sectioned key-value configuration text format
//!
//! The format used by `web.cfg` files:
//! - `Name` followed by `{` (same line or the next) opens a child section
//! - `}` on its own line closes it
//! - `key = value` defines an option (value may be empty)
//! - `#` starts a comment line; blank lines are ignored

use super::document::CfgSection;
use super::CfgError;

fn err(line: usize, message: impl Into<String>) -> CfgError {
    CfgError::Parse {
        line,
        message: message.into(),
    }
}

/// Parse the text form into a root section.
pub(super) fn parse_document(text: &str) -> Result<CfgSection, CfgError> {
    // Stack of open sections; the bottom element is the document root.
    let mut stack: Vec<CfgSection> = vec![CfgSection::default()];
    let mut open_names: Vec<String> = Vec::new();
    // A bare section name still waiting for its opening brace.
    let mut pending: Option<(String, usize)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((name, at)) = pending.take() {
            if line == "{" {
                stack.push(CfgSection::default());
                open_names.push(name);
                continue;
            }
            return Err(err(at, format!("expected '{{' after section name '{name}'")));
        }

        if line == "}" {
            let section = match stack.pop() {
                Some(s) if !stack.is_empty() => s,
                _ => return Err(err(line_no, "unbalanced '}'")),
            };
            let name = open_names.pop().unwrap_or_default();
            let parent = stack.last_mut().unwrap_or_else(|| unreachable!());
            if !parent.attach_section(name.clone(), section) {
                return Err(err(line_no, format!("duplicate definition of '{name}'")));
            }
            continue;
        }

        if let Some(stripped) = line.strip_suffix('{') {
            let name = stripped.trim();
            if name.is_empty() {
                return Err(err(line_no, "'{' without a section name"));
            }
            stack.push(CfgSection::default());
            open_names.push(name.to_string());
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                return Err(err(line_no, "option line without a key"));
            }
            let current = stack.last_mut().unwrap_or_else(|| unreachable!());
            current.set_option(key, value.trim());
            continue;
        }

        // A bare word: section name, brace expected on a following line.
        pending = Some((line.to_string(), line_no));
    }

    if let Some((name, at)) = pending {
        return Err(err(at, format!("section '{name}' is never opened")));
    }
    if stack.len() != 1 {
        return Err(err(
            text.lines().count(),
            format!("{} unclosed section(s) at end of input", stack.len() - 1),
        ));
    }
    Ok(stack.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::super::CfgDoc;
    use super::*;

    #[test]
    fn test_brace_on_next_line() {
        let d = CfgDoc::parse("WebApp\n{\n  key = value\n}\n").unwrap();
        assert_eq!(d.get_option("WebApp/key"), Some("value"));
    }

    #[test]
    fn test_brace_on_same_line() {
        let d = CfgDoc::parse("WebApp {\n  key = value\n}\n").unwrap();
        assert_eq!(d.get_option("WebApp/key"), Some("value"));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let text = "# header\n\nS\n{\n  # inner comment\n  k = v\n}\n";
        let d = CfgDoc::parse(text).unwrap();
        assert_eq!(d.get_option("S/k"), Some("v"));
    }

    #[test]
    fn test_empty_value_allowed() {
        let d = CfgDoc::parse("S\n{\n  k =\n}\n").unwrap();
        assert_eq!(d.get_option("S/k"), Some(""));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let d = CfgDoc::parse("S\n{\n  k = a=b\n}\n").unwrap();
        assert_eq!(d.get_option("S/k"), Some("a=b"));
    }

    #[test]
    fn test_unclosed_section_rejected() {
        let e = CfgDoc::parse("S\n{\n  k = v\n").unwrap_err();
        assert!(e.to_string().contains("unclosed"));
    }

    #[test]
    fn test_stray_close_rejected() {
        assert!(CfgDoc::parse("}\n").is_err());
    }

    #[test]
    fn test_name_without_brace_rejected() {
        let e = CfgDoc::parse("S\nk = v\n").unwrap_err();
        assert!(e.to_string().contains("expected '{'"));
    }

    #[test]
    fn test_duplicate_section_rejected() {
        let text = "S\n{\n}\nS\n{\n}\n";
        assert!(parse_document(text).is_err());
    }

    #[test]
    fn test_empty_input_is_empty_document() {
        let d = CfgDoc::parse("").unwrap();
        assert!(d.is_empty());
    }
}
