use lol_html::html_content::ContentType;
use lol_html::{doc_comments, rewrite_str, Settings};

use crate::ServerAppResult;

/// Writes the head and body of a page into a template.
///
/// The template marks the insertion points with `<!--%LIVELINE_HEAD%-->` and
/// `<!--%LIVELINE_BODY%-->`.
pub(crate) fn format_html<H, B>(html_s: &str, head_s: H, body_s: B) -> ServerAppResult<String>
where
    H: AsRef<str>,
    B: AsRef<str>,
{
    let head_s = head_s.as_ref();
    let body_s = body_s.as_ref();

    let rendered = rewrite_str(
        html_s,
        Settings {
            document_content_handlers: vec![doc_comments!(|c| {
                if c.text() == "%LIVELINE_HEAD%" {
                    c.replace(head_s, ContentType::Html);
                }
                if c.text() == "%LIVELINE_BODY%" {
                    c.replace(body_s, ContentType::Html);
                }

                Ok(())
            })],
            ..Default::default()
        },
    )?;

    Ok(rendered)
}
