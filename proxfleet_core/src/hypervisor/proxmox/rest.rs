use crate::config::Credentials;

// Http
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, COOKIE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use url::Url;

// Serde
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// Error Handling
use log::{debug, trace};
use proxfleet_error::{LibError, ProxfleetError, WrapError};

/// Every Proxmox api answer wraps its payload in a `data` field.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Ticket {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf: String,
}

#[derive(Clone)]
enum Auth {
    /// Password login: cookie on every request, csrf token on writes.
    Ticket { cookie: String, csrf: String },
    /// `PVEAPIToken=<user>!<name>=<value>`
    Token(String),
}

/// A http client bound to one Proxmox api.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base: Url,
    auth: Option<Auth>,
}

impl RestClient {
    pub fn new(url: &str, verify_tls: bool) -> Result<Self, ProxfleetError> {
        let mut base = Url::parse(url)?;
        base.set_path("/api2/json");
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base,
            auth: None,
        })
    }

    /*
     * Authenticate against the api.
     * Tokens are used as is, passwords are exchanged for a ticket.
     */
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), ProxfleetError> {
        match credentials {
            Credentials::Token { user, name, value } => {
                self.auth = Some(Auth::Token(format!("PVEAPIToken={user}!{name}={value}")));
            }
            Credentials::Password { user, password } => {
                let url = self.url(&["access", "ticket"])?;
                let response = self
                    .client
                    .post(url.clone())
                    .form(&[("username", user.as_str()), ("password", password.as_str())])
                    .send()
                    .await;
                let ticket: Ticket = match response {
                    Ok(response) => Self::to_value(&url, response).await?,
                    Err(e) => {
                        let message = format!("Couldn't authenticate {} on {}", user, self.base);
                        return Err(WrapError::builder()
                            .msg(&message)
                            .help("Is the Proxmox api reachable?")
                            .origin(ProxfleetError::from(e).into())
                            .build()
                            .into());
                    }
                };
                self.auth = Some(Auth::Ticket {
                    cookie: format!("PVEAuthCookie={}", ticket.ticket),
                    csrf: ticket.csrf,
                });
            }
        }
        Ok(())
    }

    /// Build an endpoint url from path segments,
    /// segments are escaped (task ids contain ':' and '@').
    pub fn url(&self, segments: &[&str]) -> Result<Url, ProxfleetError> {
        let mut url = self.base.clone();
        match url.path_segments_mut() {
            Ok(mut path) => {
                path.pop_if_empty().extend(segments);
            }
            Err(_) => {
                let message = format!("Can't build an endpoint from {}", self.base);
                return Err(LibError::builder()
                    .msg(&message)
                    .help("The host url must be an http(s) url.")
                    .build()
                    .into());
            }
        }
        Ok(url)
    }

    fn headers(&self, method: &Method) -> Result<HeaderMap, ProxfleetError> {
        let mut headers = HeaderMap::new();
        let invalid = |_: InvalidHeaderValue| -> ProxfleetError {
            LibError::builder()
                .msg("Invalid characters in credentials")
                .help("")
                .build()
                .into()
        };
        match &self.auth {
            Some(Auth::Token(token)) => {
                headers.insert(AUTHORIZATION, HeaderValue::from_str(token).map_err(invalid)?);
            }
            Some(Auth::Ticket { cookie, csrf }) => {
                headers.insert(COOKIE, HeaderValue::from_str(cookie).map_err(invalid)?);
                if *method != Method::GET {
                    headers.insert(
                        "CSRFPreventionToken",
                        HeaderValue::from_str(csrf).map_err(invalid)?,
                    );
                }
            }
            None => {}
        }
        Ok(headers)
    }

    fn request(&self, method: Method, url: &Url) -> Result<RequestBuilder, ProxfleetError> {
        let headers = self.headers(&method)?;
        Ok(self.client.request(method, url.clone()).headers(headers))
    }

    /*
     * Send an http GET request.
     * Arguments:
     * - segments: the endpoint path (ex: ["nodes", "pve1", "qemu"])
     */
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ProxfleetError> {
        let url = self.url(segments)?;
        trace!("GET {}", url);
        let response = self.request(Method::GET, &url)?.send().await?;
        Self::to_value(&url, response).await
    }

    /*
     * Send an http POST request with a form encoded body.
     */
    pub async fn post<T, B>(&self, segments: &[&str], body: &B) -> Result<T, ProxfleetError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        trace!("POST {}", url);
        let response = self.request(Method::POST, &url)?.form(body).send().await?;
        Self::to_value(&url, response).await
    }

    /*
     * Send an http DELETE request.
     */
    pub async fn delete<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ProxfleetError> {
        let url = self.url(segments)?;
        trace!("DELETE {}", url);
        let response = self.request(Method::DELETE, &url)?.send().await?;
        Self::to_value(&url, response).await
    }

    async fn to_value<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T, ProxfleetError> {
        let status: StatusCode = response.status();
        if status.is_success() {
            let envelope: Envelope<T> = response.json().await?;
            Ok(envelope.data)
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!("{} {} {}", status, url, body);
            let message = "Http response error";
            let help = format!("{} {}: {}", status, url.path(), body.trim());
            Err(LibError::builder().msg(message).help(&help).build().into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn build_endpoints() -> miette::Result<()> {
        let rest = RestClient::new("https://10.0.0.1:8006", false)?;
        let url = rest.url(&["nodes", "pve1", "tasks", "UPID:pve1:0001:qmclone:105:root@pam:", "status"])?;
        assert_eq!(url.host_str(), Some("10.0.0.1"));
        assert_eq!(url.port(), Some(8006));
        assert!(url.path().starts_with("/api2/json/nodes/pve1/tasks/UPID"));
        assert!(url.path().ends_with("/status"));
        Ok(())
    }

    #[test]
    fn token_header() -> miette::Result<()> {
        let mut rest = RestClient::new("https://pve.lan:8006/", true)?;
        rest.auth = Some(Auth::Token("PVEAPIToken=root@pam!ci=abcd".to_owned()));
        let headers = rest.headers(&Method::POST)?;
        assert_eq!(
            headers.get(AUTHORIZATION).and_then(|e| e.to_str().ok()),
            Some("PVEAPIToken=root@pam!ci=abcd")
        );
        Ok(())
    }

    #[test]
    fn ticket_headers() -> miette::Result<()> {
        let mut rest = RestClient::new("https://pve.lan:8006", true)?;
        rest.auth = Some(Auth::Ticket {
            cookie: "PVEAuthCookie=PVE:root@pam:XYZ".to_owned(),
            csrf: "XYZ:CSRF".to_owned(),
        });
        assert!(rest.headers(&Method::GET)?.get("CSRFPreventionToken").is_none());
        assert!(rest.headers(&Method::POST)?.get("CSRFPreventionToken").is_some());
        Ok(())
    }
}
