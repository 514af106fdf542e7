use std::fmt;
use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;

use liveline_bridge::{BoundPair, Snapshot};
use liveline_core::{MODE_META_NAME, STATE_ELEMENT_ID};

use crate::{html, RenderRequest, ServerAppProps, ServerAppResult};

/// The Liveline Backend Renderer.
///
/// The renderer runs the application of a request with the bound pair of the request. After
/// the application has resolved its loaders, every ready entry of the cache is dehydrated into a
/// [`Snapshot`] and written into the page, so the client can hydrate its own cache without
/// subscribing again.
///
/// The snapshot is written into the template at `<!--%LIVELINE_HEAD%-->` as a
/// `<script type="application/json">` element. The output of the application is written at
/// `<!--%LIVELINE_BODY%-->`.
pub struct ServerRenderer<REQ> {
    request: REQ,
    pair: BoundPair,
}

impl<REQ> fmt::Debug for ServerRenderer<REQ> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerRenderer<_>")
    }
}

impl<REQ> ServerRenderer<REQ>
where
    REQ: 'static + RenderRequest,
{
    /// Creates a Renderer with specified request and the bound pair of that request.
    ///
    /// The pair must not be shared with any other request.
    pub fn new(request: REQ, pair: BoundPair) -> Self {
        Self { request, pair }
    }

    /// Renders the application.
    ///
    /// `app` receives the properties of the request and returns the html of the page body.
    pub async fn render<F, Fut>(self, app: F) -> ServerAppResult<String>
    where
        F: FnOnce(ServerAppProps<REQ>) -> Fut,
        Fut: Future<Output = ServerAppResult<String>>,
    {
        let Self { request, pair } = self;
        let request = Arc::new(request);

        let mut head_s = String::new();

        if request.is_client_only() {
            tracing::debug!(path = request.path(), "rendering client only page");
            let _ = write!(&mut head_s, r#"<meta name="{MODE_META_NAME}" content="render">"#);

            return html::format_html(request.template(), head_s, "");
        }

        let props = ServerAppProps::new(request.clone(), pair.clone());
        let body_s = app(props).await?;

        let snapshot = pair.cache().dehydrate();
        tracing::debug!(
            path = request.path(),
            entries = snapshot.len(),
            "rendered page"
        );

        let _ = write!(&mut head_s, r#"<meta name="{MODE_META_NAME}" content="hydrate">"#);
        write_state(&mut head_s, &snapshot)?;

        html::format_html(request.template(), head_s, body_s)
    }
}

fn write_state(w: &mut String, snapshot: &Snapshot) -> ServerAppResult<()> {
    let state_s = snapshot.to_script_json()?;
    let _ = write!(
        w,
        r#"<script type="application/json" id="{STATE_ELEMENT_ID}">{state_s}</script>"#
    );

    Ok(())
}
