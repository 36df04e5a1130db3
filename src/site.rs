//! Browser session against the state lobbyist search portal. The search form
//! is ASP.NET with postbacks on every control, so a real browser drives it;
//! exports and documents come back through an in-page `fetch` so they stay
//! inside the authenticated session.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ReportType;

#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use base64::Engine;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tracing::{debug, info};

#[cfg(feature = "browser")]
use crate::config::SEARCH_URL;
#[cfg(feature = "browser")]
use crate::error::PipelineError;

/// Driver-facing view of the portal: the crawl and export stages only talk
/// to this surface, so tests can script a portal without a browser.
#[async_trait]
pub trait SearchDriver {
    /// Year labels offered by the export form, "All Years" excluded.
    async fn year_options(&self) -> Result<Vec<String>>;
    /// Export one year's report as PDF bytes.
    async fn export_report(&self, report: ReportType, year: &str) -> Result<Vec<u8>>;
    /// Run a last-name search and return the results-page HTML.
    async fn search_last_name(&self, last_name: &str) -> Result<String>;
}

#[cfg(feature = "browser")]
pub struct PortalDriver {
    // Kept alive for the session; dropping the browser ends it.
    _browser: Browser,
    page: Page,
}

#[cfg(feature = "browser")]
fn driver<E: std::fmt::Display>(err: E) -> PipelineError {
    PipelineError::Driver(err.to_string())
}

#[cfg(feature = "browser")]
impl PortalDriver {
    pub async fn launch() -> Result<PortalDriver> {
        info!("Launching browser session for {}", SEARCH_URL);
        let config = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .build()
            .map_err(PipelineError::Driver)?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(driver)?;
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });
        let page = browser.new_page(SEARCH_URL).await.map_err(driver)?;
        page.wait_for_navigation().await.map_err(driver)?;
        Ok(PortalDriver {
            _browser: browser,
            page,
        })
    }

    async fn await_selector(&self, selector: &str) -> Result<()> {
        for _ in 0..40 {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Err(PipelineError::Driver(format!(
            "timed out waiting for {selector}"
        )))
    }

    /// The public/private toggle posts back, so give the page time to settle.
    async fn set_public_mode(&self, public: bool) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const box = document.querySelector('#ctl00_MainContent_chkSearchByPublic');
                if (box.checked !== {public}) {{ box.click(); }}
                return box.checked;
            }})()"#
        );
        self.page.evaluate(script).await.map_err(driver)?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(())
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl SearchDriver for PortalDriver {
    async fn year_options(&self) -> Result<Vec<String>> {
        self.await_selector("select#ctl00_MainContent_slctYears")
            .await?;
        let script = r#"Array.from(
            document.querySelectorAll('#ctl00_MainContent_slctYears option')
        ).map(o => o.textContent.trim())"#;
        let labels: Vec<String> = self
            .page
            .evaluate(script)
            .await
            .map_err(driver)?
            .into_value()
            .map_err(driver)?;
        Ok(labels
            .into_iter()
            .filter(|label| !label.eq_ignore_ascii_case("all years"))
            .collect())
    }

    async fn export_report(&self, report: ReportType, year: &str) -> Result<Vec<u8>> {
        self.set_public_mode(report == ReportType::Public).await?;
        let quoted = serde_json::to_string(year)?;
        let script = format!(
            r#"(async () => {{
                try {{
                    const sel = document.querySelector('#ctl00_MainContent_slctYears');
                    const opt = Array.from(sel.options).find(o => o.textContent.trim() === {quoted});
                    if (!opt) {{ return {{ error: 'no year option ' + {quoted} }}; }}
                    if (sel.value !== opt.value) {{
                        sel.value = opt.value;
                        sel.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    }}
                    const link = document.querySelector('a#ctl00_MainContent_ExportButton');
                    const response = await fetch(link.href, {{
                        method: 'GET',
                        credentials: 'include',
                        headers: {{ 'Accept': 'application/pdf, */*' }}
                    }});
                    if (!response.ok) {{
                        return {{ error: 'HTTP ' + response.status, status: response.status, url: link.href }};
                    }}
                    const bytes = new Uint8Array(await (await response.blob()).arrayBuffer());
                    let binary = '';
                    for (let i = 0; i < bytes.length; i++) {{
                        binary += String.fromCharCode(bytes[i]);
                    }}
                    return {{ status: response.status, data: btoa(binary), url: link.href }};
                }} catch (e) {{
                    return {{ error: e.toString() }};
                }}
            }})()"#
        );
        let result: serde_json::Value = self
            .page
            .evaluate(script)
            .await
            .map_err(driver)?
            .into_value()
            .map_err(driver)?;

        if let Some(err) = result.get("error").and_then(|e| e.as_str()) {
            if let Some(status) = result.get("status").and_then(|s| s.as_u64()) {
                let url = result
                    .get("url")
                    .and_then(|u| u.as_str())
                    .unwrap_or(SEARCH_URL)
                    .to_string();
                return Err(PipelineError::FetchFailure {
                    url,
                    status: status as u16,
                });
            }
            return Err(PipelineError::Driver(err.to_string()));
        }

        let data = result.get("data").and_then(|d| d.as_str()).unwrap_or("");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(driver)?;
        debug!(
            "Exported {} {} report: {} bytes",
            year,
            report.as_str(),
            bytes.len()
        );
        Ok(bytes)
    }

    async fn search_last_name(&self, last_name: &str) -> Result<String> {
        let quoted = serde_json::to_string(last_name)?;
        let script = format!(
            r#"(() => {{
                const box = document.querySelector('#ctl00_MainContent_txtLastName');
                box.value = {quoted};
                box.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return box.value;
            }})()"#
        );
        self.page.evaluate(script).await.map_err(driver)?;
        self.page
            .find_element("a#ctl00_MainContent_SearchButton")
            .await
            .map_err(driver)?
            .click()
            .await
            .map_err(driver)?;
        self.page.wait_for_navigation().await.map_err(driver)?;
        self.await_selector("table#DataTables_Table_0").await?;

        // Widen the result-length selector so every row is in the DOM.
        let widen = r#"(() => {
            const sel = document.querySelector('select[name="DataTables_Table_0_length"]');
            if (sel) {
                sel.value = '1000';
                sel.dispatchEvent(new Event('change', { bubbles: true }));
            }
            return true;
        })()"#;
        self.page.evaluate(widen).await.map_err(driver)?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        self.page.content().await.map_err(driver)
    }
}

// Stub for when browser support is compiled out.
#[cfg(not(feature = "browser"))]
pub struct PortalDriver;

#[cfg(not(feature = "browser"))]
impl PortalDriver {
    pub async fn launch() -> Result<PortalDriver> {
        Err(crate::error::PipelineError::Driver(
            "browser support not compiled; rebuild with --features browser".to_string(),
        ))
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl SearchDriver for PortalDriver {
    async fn year_options(&self) -> Result<Vec<String>> {
        PortalDriver::launch().await.map(|_| Vec::new())
    }

    async fn export_report(&self, _report: ReportType, _year: &str) -> Result<Vec<u8>> {
        PortalDriver::launch().await.map(|_| Vec::new())
    }

    async fn search_last_name(&self, _last_name: &str) -> Result<String> {
        PortalDriver::launch().await.map(|_| String::new())
    }
}
