//! Live reload script injection for served HTML documents.

/// Tag the reload listener is inserted in front of.
pub const CLOSING_BODY_TAG: &[u8] = b"</body>";

/// Browser-side listener: opens a duplex channel to `/ws` on the serving host and reloads the
/// page when the server pushes `reload`.
pub const RELOAD_SCRIPT: &str = "<script>\n\
let socket = new WebSocket(\"ws://\" + location.host + \"/ws\");\n\
socket.onmessage = function(event) {\n\
\tif (event.data === \"reload\") {\n\
\t\tlocation.reload();\n\
\t}\n\
};\n\
</script>";

/// Insert [`RELOAD_SCRIPT`] immediately before the first `</body>` in `html`.
///
/// Documents without a closing body tag come back unchanged. At most one script is inserted
/// and the surrounding bytes are copied verbatim, so non-UTF-8 documents are safe.
pub fn inject(html: &[u8]) -> Vec<u8> {
    let Some(pos) = find(html, CLOSING_BODY_TAG) else {
        return html.to_vec();
    };
    let mut out = Vec::with_capacity(html.len() + RELOAD_SCRIPT.len());
    out.extend_from_slice(&html[..pos]);
    out.extend_from_slice(RELOAD_SCRIPT.as_bytes());
    out.extend_from_slice(&html[pos..]);
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
