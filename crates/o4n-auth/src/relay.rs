//! Preview relay protocol.
//!
//! Preview deployments are not registered with the IdP. Their login page
//! sends the browser to the production login with `redirect_to` pointing at
//! the preview's own auth endpoint; production stores that in the carrier
//! cookie, and after verifying the IdP token its auth endpoint POSTs the same
//! token to the preview instead of minting a session itself.

use url::{Origin, Url};

use crate::gateway::{AUTH_PATH, LOGIN_PATH};
use crate::redirect::strip_script_breaking;

/// The preview's auth endpoint: same scheme and host as `effective`, fixed
/// path, no query or fragment.
pub fn preview_callback_url(effective: &Url) -> Url {
    let mut callback = effective.clone();
    callback.set_path(AUTH_PATH);
    callback.set_query(None);
    callback.set_fragment(None);
    callback
}

/// Production login URL asking production to hand the token to `callback`.
pub fn relay_login_url(prod_base: &Url, callback: &Url) -> Url {
    let mut login = prod_base.clone();
    login.set_path(LOGIN_PATH);
    login.set_fragment(None);
    login
        .query_pairs_mut()
        .clear()
        .append_pair("redirect_to", callback.as_str());
    login
}

/// Whether a carrier destination asks for a relay rather than a session.
///
/// The destination must end with the auth endpoint path. With a non-empty
/// `allowed` list its origin must also be listed.
pub fn is_relay_target(destination: &str, allowed: &[Origin]) -> bool {
    if !destination.ends_with(AUTH_PATH) {
        return false;
    }
    if allowed.is_empty() {
        return true;
    }
    Url::parse(destination).is_ok_and(|u| allowed.contains(&u.origin()))
}

/// Inputs for [`render_relay_page`].
#[derive(Debug, Clone, Copy)]
pub struct RelayPage<'a> {
    /// Page title.
    pub title: &'a str,
    /// Preview auth endpoint to POST to.
    pub destination: &'a str,
    /// The verified identity token, forwarded unchanged.
    pub id_token: &'a str,
    /// Manual button plus dumps instead of auto-submit.
    pub debug: Option<(&'a str, &'a str)>,
}

/// HTML page that POSTs `id_token` to the preview's auth endpoint.
pub fn render_relay_page(page: &RelayPage<'_>) -> String {
    let destination = strip_script_breaking(page.destination);
    let token = strip_script_breaking(page.id_token);

    let action = match page.debug {
        Some((event, context)) => {
            // Attribute text is entity-decoded before the script runs.
            let destination = destination.replace('&', "&amp;");
            let token = token.replace('&', "&amp;");
            format!(
                r#"
              <p>
                <button onClick='javascript:post("{destination}", {{id_token: "{token}"}})'>
                  Proceed with POST of token
                </button>
                (debug mode)
              </p>
              <h2>Event</h2>
              <pre>{event}</pre>
              <h2>Context</h2>
              <pre>{context}</pre>
              "#
            )
        }
        None => format!(
            r#"
              <script>
                post("{destination}", {{id_token: "{token}"}});
              </script>
              "#
        ),
    };

    format!(
        r#"<!DOCTYPE html>
      <html lang="en">
          <head>
              <title>{title}</title>
              <script>
              function post(path, params, method = "post") {{
                const form = document.createElement("form");
                form.method = method;
                form.action = path;

                for (const key in params) {{
                  if (params.hasOwnProperty(key)) {{
                    const hiddenField = document.createElement("input");
                    hiddenField.type = "hidden";
                    hiddenField.name = key;
                    hiddenField.value = params[key];

                    form.appendChild(hiddenField);
                  }}
                }}

                document.body.appendChild(form);
                form.submit();
              }}
              </script>
          </head>
          <body>
              <p>Redirecting to preview site...</p>
              {action}
          </body>
      </html>"#,
        title = page.title,
    )
}

/// `Login` or `Login: <site title>`.
pub(crate) fn page_title(site_title: Option<&str>) -> String {
    match site_title.filter(|t| !t.is_empty()) {
        Some(t) => format!("Login: {}", strip_markup(t)),
        None => "Login".to_string(),
    }
}

fn strip_markup(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '<' | '>')).collect()
}
