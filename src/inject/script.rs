//! Tracking snippet construction.
//!
//! In `tag` mode the snippet references `/<forward_path>/script.js`, which
//! the forward proxy serves from the collector. In `source` mode the
//! collector script is downloaded once at startup and inlined.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{ACCEPT, USER_AGENT};
use thiserror::Error;

use crate::config::{ScriptInjectionMode, UmamiConfig};

/// Errors raised while preparing the snippet.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("collector answered {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Build the snippet for `config`, downloading the script in `source` mode.
///
/// Returns an empty snippet when injection is disabled.
pub async fn load_snippet(
    client: &reqwest::Client,
    config: &UmamiConfig,
) -> Result<String, ScriptError> {
    if !config.script_injection {
        return Ok(String::new());
    }

    let source = match config.script_injection_mode {
        ScriptInjectionMode::Source => Some(download_script(client, config).await?),
        ScriptInjectionMode::Tag => None,
    };

    Ok(build_snippet(config, source.as_deref()))
}

/// Fetch `<umami_host>/script.js` and point its API calls at the forward path.
pub async fn download_script(
    client: &reqwest::Client,
    config: &UmamiConfig,
) -> Result<String, ScriptError> {
    let url = format!("{}/script.js", config.umami_base());

    let response = client
        .get(&url)
        .header(USER_AGENT, concat!("umami-proxy/", env!("CARGO_PKG_VERSION")))
        .header(ACCEPT, "application/javascript")
        .send()
        .await
        .map_err(|source| ScriptError::Download {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScriptError::Status { url, status });
    }

    let body = response
        .text()
        .await
        .map_err(|source| ScriptError::Download {
            url: url.clone(),
            source,
        })?;

    tracing::info!(url = %url, bytes = body.len(), "Downloaded collector script");
    Ok(rewrite_api_path(&body, config.forward_prefix()))
}

fn rewrite_api_path(script: &str, forward_prefix: &str) -> String {
    script.replace("/api", &format!("/{}/api", forward_prefix))
}

/// Render the snippet HTML. `source` is the inlined script for `source` mode.
pub fn build_snippet(config: &UmamiConfig, source: Option<&str>) -> String {
    let src = format!("/{}/script.js", config.forward_prefix());
    let inline = match config.script_injection_mode {
        ScriptInjectionMode::Source => source,
        ScriptInjectionMode::Tag => None,
    };

    let mut attrs: Vec<(&str, String)> = vec![
        ("data-website-id", config.website_id.clone()),
        ("data-auto-track", config.auto_track.to_string()),
    ];
    if config.do_not_track {
        attrs.push(("data-do-not-track", "true".into()));
    }
    if config.cache {
        attrs.push(("data-cache", "true".into()));
    }
    if !config.domains.is_empty() {
        attrs.push(("data-domains", config.domains.join(",")));
    }

    if config.evade_google_tag_manager {
        let mut html = String::from("<script>(function () {var el = document.createElement('script');");
        match inline {
            Some(script) => {
                html.push_str("el.setAttribute('type', 'text/javascript');");
                html.push_str(&format!("el.innerHTML = atob('{}');", STANDARD.encode(script)));
            }
            None => html.push_str(&format!("el.setAttribute('src', '{}');", src)),
        }
        for (name, value) in &attrs {
            html.push_str(&format!("el.setAttribute('{}', '{}');", name, value));
        }
        html.push_str("document.body.appendChild(el);})();</script>");
        return html;
    }

    let mut html = String::from("<script async defer");
    if inline.is_none() {
        html.push_str(&format!(" src='{}'", src));
    }
    for (name, value) in &attrs {
        html.push_str(&format!(" {}='{}'", name, value));
    }
    html.push('>');
    if let Some(script) = inline {
        html.push_str(script);
    }
    html.push_str("</script>");
    html
}
