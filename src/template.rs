use std::path::Path;

use minijinja::{context, Environment, UndefinedBehavior};

use crate::error::ChainError;

const TEMPLATE_NAME: &str = "prompt";
const HISTORY_SENTINEL: &str = "\u{1}history\u{1}";
const INPUT_SENTINEL: &str = "\u{1}input\u{1}";

/// Instruction text with `{{ history }}` and `{{ input }}` placeholders.
///
/// The source is compiled once; rendering never mutates it. Construction
/// fails when either placeholder is not referenced, and rendering fails on
/// any other variable.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    env: Environment<'static>,
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Result<Self, ChainError> {
        let source = source.into();
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_template_owned(TEMPLATE_NAME, source.clone())?;

        let template = Self { env, source };
        let rendered = template.render(HISTORY_SENTINEL, INPUT_SENTINEL)?;
        if !rendered.contains(HISTORY_SENTINEL) {
            return Err(ChainError::MissingPlaceholder("history"));
        }
        if !rendered.contains(INPUT_SENTINEL) {
            return Err(ChainError::MissingPlaceholder("input"));
        }
        Ok(template)
    }

    pub fn from_file(path: &Path) -> Result<Self, ChainError> {
        let source = std::fs::read_to_string(path).map_err(|source| ChainError::TemplateIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, history: &str, input: &str) -> Result<String, ChainError> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        Ok(template.render(context! { history => history, input => input })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_render_fills_both_placeholders() {
        let template = PromptTemplate::new("History:\n{{ history }}\nInput: {{ input }}\n").unwrap();
        let rendered = template.render("Human: a", "b").unwrap();
        assert_eq!(rendered, "History:\nHuman: a\nInput: b\n");
    }

    #[test]
    fn test_values_are_not_evaluated() {
        let template = PromptTemplate::new("{{ history }}|{{ input }}").unwrap();
        let rendered = template.render("", "{{ history }} <b>").unwrap();
        assert_eq!(rendered, "|{{ history }} <b>");
    }

    #[test]
    fn test_missing_placeholder_is_rejected() {
        let err = PromptTemplate::new("only {{ input }}").unwrap_err();
        assert!(matches!(err, ChainError::MissingPlaceholder("history")));

        let err = PromptTemplate::new("only {{ history }}").unwrap_err();
        assert!(matches!(err, ChainError::MissingPlaceholder("input")));
    }

    #[test]
    fn test_unknown_variable_is_rejected() {
        let err = PromptTemplate::new("{{ history }} {{ input }} {{ persona }}").unwrap_err();
        assert!(matches!(err, ChainError::Template(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Past: {{{{ history }}}}\nNow: {{{{ input }}}}").unwrap();

        let template = PromptTemplate::from_file(file.path()).unwrap();
        assert_eq!(template.render("x", "y").unwrap(), "Past: x\nNow: y");
        assert!(template.source().starts_with("Past:"));
    }

    #[test]
    fn test_from_missing_file() {
        let err = PromptTemplate::from_file(Path::new("/nonexistent/prompt.txt")).unwrap_err();
        assert!(matches!(err, ChainError::TemplateIo { .. }));
    }
}
