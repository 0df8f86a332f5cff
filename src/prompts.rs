//! Page prompt for cloud structuring.
//!
//! The prompt is deterministic: the same page number always yields the same
//! text, so two runs over one document send identical requests. Callers can
//! override it via [`crate::config::ConversionConfig::prompt_template`]; the
//! `{page}` placeholder is substituted in either case.

/// Default page prompt (Portuguese, matching the output headings).
pub const DEFAULT_PAGE_PROMPT: &str = "A imagem a seguir é a página {page} de um documento.

Sua única tarefa é realizar o OCR e extrair todo o conteúdo textual desta imagem.

Preserve a estrutura original (parágrafos, títulos, listas, tabelas, etc.).

Formate a saída inteiramente em Markdown. Use cabeçalhos (#, ##, ###) para títulos e seções.

Não inclua nenhuma explicação, introdução, ou texto adicional antes ou depois do conteúdo Markdown.

Gere o conteúdo Markdown para a Página {page}:";

/// Build the prompt for `page_num`, from `template` or the default.
pub fn page_prompt(page_num: usize, template: Option<&str>) -> String {
    template
        .unwrap_or(DEFAULT_PAGE_PROMPT)
        .replace("{page}", &page_num.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_names_the_page_twice() {
        let p = page_prompt(12, None);
        assert!(p.contains("página 12 de um documento"));
        assert!(p.ends_with("Página 12:"));
        assert!(!p.contains("{page}"));
    }

    #[test]
    fn prompt_is_deterministic() {
        assert_eq!(page_prompt(3, None), page_prompt(3, None));
        assert_ne!(page_prompt(3, None), page_prompt(4, None));
    }

    #[test]
    fn custom_template_is_used() {
        assert_eq!(page_prompt(5, Some("Transcreva a página {page}.")), "Transcreva a página 5.");
    }
}
