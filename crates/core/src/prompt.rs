//! Prompt templates with `{name}` placeholders.
//!
//! Values are substituted verbatim: no escaping, truncation or length limit.
//! `{{` and `}}` render as literal braces.

use std::collections::BTreeMap;

use crate::domain::{Question, RenderedPrompt};
use crate::errors::DomainError;

/// Instruction sent to the agent for every inventory question.
pub const INVENTORY_TEMPLATE: &str = "
Você é um especialista em análise de estoque. Use as ferramentas SQL disponíveis para responder perguntas sobre inventário.

INSTRUÇÕES IMPORTANTES:
1. Seja direto e eficiente nas consultas SQL
2. Se uma consulta falhar, tente uma abordagem mais simples
3. Sempre formate a resposta final em português brasileiro
4. Forneça apenas a resposta final, sem explicar o processo
5. Não mencione detalhes técnicos sobre a execução da query

Pergunta do usuário: {q}

Analise a pergunta e execute as consultas necessárias para dar uma resposta completa.
";

pub const QUESTION_VARIABLE: &str = "q";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    pub fn from_template(template: &str) -> Result<Self, DomainError> {
        let mut segments = Vec::new();
        let mut input_variables: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((index, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, next)) => name.push(next),
                            None => return Err(DomainError::UnterminatedPlaceholder(index)),
                        }
                    }

                    let name = name.trim().to_string();
                    if name.is_empty() {
                        return Err(DomainError::InvalidTemplate(format!(
                            "empty placeholder at byte {index}"
                        )));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    if !input_variables.contains(&name) {
                        input_variables.push(name.clone());
                    }
                    segments.push(Segment::Variable(name));
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments, input_variables })
    }

    /// Placeholder names in order of first appearance.
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    pub fn format<'a, I>(&self, values: I) -> Result<String, DomainError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let values = values.into_iter().collect::<BTreeMap<_, _>>();
        let mut rendered = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Variable(name) => {
                    let value = values
                        .get(name.as_str())
                        .ok_or_else(|| DomainError::MissingTemplateVariable(name.clone()))?;
                    rendered.push_str(value);
                }
            }
        }

        Ok(rendered)
    }
}

/// Renders a template with exactly one `{q}` placeholder around a question.
#[derive(Clone, Debug)]
pub struct PromptBuilder {
    template: PromptTemplate,
}

impl PromptBuilder {
    pub fn new(template: &str) -> Result<Self, DomainError> {
        let template = PromptTemplate::from_template(template)?;
        if template.input_variables() != [QUESTION_VARIABLE] {
            return Err(DomainError::InvalidTemplate(format!(
                "expected exactly one `{{{QUESTION_VARIABLE}}}` placeholder, found {:?}",
                template.input_variables()
            )));
        }
        Ok(Self { template })
    }

    pub fn inventory() -> Result<Self, DomainError> {
        Self::new(INVENTORY_TEMPLATE)
    }

    pub fn build(&self, question: &Question) -> Result<RenderedPrompt, DomainError> {
        self.template.format([(QUESTION_VARIABLE, question.as_str())]).map(RenderedPrompt::new)
    }
}

#[cfg(test)]
mod tests {
    use super::{PromptBuilder, PromptTemplate, INVENTORY_TEMPLATE};
    use crate::domain::Question;
    use crate::errors::DomainError;

    #[test]
    fn placeholders_are_discovered_in_order() {
        let template = PromptTemplate::from_template("Q: {input}\n{tools} {input}").expect("ok");
        assert_eq!(template.input_variables(), ["input".to_string(), "tools".to_string()]);
    }

    #[test]
    fn doubled_braces_are_literal() {
        let template = PromptTemplate::from_template("{{\"json\": {value}}}").expect("ok");
        let rendered = template.format([("value", "1")]).expect("render");
        assert_eq!(rendered, "{\"json\": 1}");
    }

    #[test]
    fn missing_value_is_reported() {
        let template = PromptTemplate::from_template("{a} {b}").expect("ok");
        assert_eq!(
            template.format([("a", "x")]),
            Err(DomainError::MissingTemplateVariable("b".to_string()))
        );
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        assert_eq!(
            PromptTemplate::from_template("abc {q"),
            Err(DomainError::UnterminatedPlaceholder(4))
        );
    }

    #[test]
    fn inventory_prompt_embeds_question_verbatim() {
        let builder = PromptBuilder::inventory().expect("inventory template is valid");
        let question = Question::parse("Quais produtos têm {chaves} e\nquebras de linha?")
            .expect("valid question");

        let prompt = builder.build(&question).expect("render");

        assert!(prompt.as_str().contains(question.as_str()));
        assert!(prompt.as_str().contains("Pergunta do usuário: Quais produtos"));
        assert!(!prompt.as_str().contains("{q}"));
    }

    #[test]
    fn long_questions_are_not_truncated() {
        let builder = PromptBuilder::inventory().expect("inventory template is valid");
        let long = "estoque ".repeat(5_000);
        let question = Question::parse(long.clone()).expect("valid question");

        let prompt = builder.build(&question).expect("render");

        assert!(prompt.as_str().contains(&long));
        assert_eq!(prompt.as_str().len(), INVENTORY_TEMPLATE.len() - "{q}".len() + long.len());
    }

    #[test]
    fn builder_requires_a_single_question_placeholder() {
        let builder = PromptBuilder::new("no placeholder");
        assert!(matches!(builder, Err(DomainError::InvalidTemplate(_))));
        assert!(matches!(PromptBuilder::new("{q} {extra}"), Err(DomainError::InvalidTemplate(_))));
        assert!(PromptBuilder::new("Pergunta: {q}").is_ok());
    }
}
