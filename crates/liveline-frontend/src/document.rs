use liveline_core::{MODE_META_NAME, STATE_ELEMENT_ID};
use lol_html::{element, rewrite_str, text, Settings};

use crate::{FrontendResult, RenderMode};

/// What a server rendered page tells the client about itself.
#[derive(Debug, Default)]
pub(crate) struct PageState {
    pub mode: RenderMode,
    pub state: Option<String>,
}

/// Reads the render mode and the embedded state of a page.
pub(crate) fn read_page(html_s: &str) -> FrontendResult<PageState> {
    let mut mode = RenderMode::Render;
    let mut state: Option<String> = None;

    rewrite_str(
        html_s,
        Settings {
            element_content_handlers: vec![
                element!(format!(r#"meta[name="{MODE_META_NAME}"]"#), |el| {
                    if el.get_attribute("content").as_deref() == Some("hydrate") {
                        mode = RenderMode::Hydrate;
                    }

                    Ok(())
                }),
                text!(format!("script#{STATE_ELEMENT_ID}"), |t| {
                    state.get_or_insert_with(String::new).push_str(t.as_str());

                    Ok(())
                }),
            ],
            ..Default::default()
        },
    )?;

    Ok(PageState { mode, state })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_hydrate_pages() {
        let page = read_page(
            r#"<html><head><meta name="liveline-mode" content="hydrate"><script type="application/json" id="liveline-state">{"entries":[]}</script></head><body></body></html>"#,
        )
        .unwrap();

        assert_eq!(page.mode, RenderMode::Hydrate);
        assert_eq!(page.state.as_deref(), Some(r#"{"entries":[]}"#));
    }

    #[test]
    fn pages_without_meta_are_rendered() {
        let page = read_page("<html><head></head><body><p>hi</p></body></html>").unwrap();

        assert_eq!(page.mode, RenderMode::Render);
        assert!(page.state.is_none());
    }

    #[test]
    fn client_only_pages_are_rendered() {
        let page = read_page(
            r#"<html><head><meta name="liveline-mode" content="render"></head><body></body></html>"#,
        )
        .unwrap();

        assert_eq!(page.mode, RenderMode::Render);
    }
}
