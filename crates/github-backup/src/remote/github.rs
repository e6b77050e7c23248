use std::cell::Cell;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, LINK};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::GithubSettings;
use crate::error::{Error, Result};
use crate::remote::{
    CommitComment, Comment, Hook, Issue, IssueState, Milestone, Organization, PullRequest,
    RemoteSource, RepoName, Repository, Team, User, UserRef,
};

const PER_PAGE: u32 = 100;
// Hard stop for runaway pagination.
const MAX_PAGES: usize = 1000;

enum Auth {
    Anonymous,
    Bearer(String),
    Basic { login: String, token: String },
}

/// GitHub REST v3 client.
pub struct GithubClient {
    client: Client,
    base: String,
    auth: Auth,
    requests: Cell<u64>,
}

#[derive(Debug, Deserialize)]
struct RateLimitDoc {
    rate: RateDoc,
}

#[derive(Debug, Deserialize)]
struct RateDoc {
    remaining: i64,
}

impl GithubClient {
    pub fn new(settings: &GithubSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;

        let auth = match (settings.login.as_deref(), settings.resolve_token()) {
            (Some(login), Some(token)) => Auth::Basic {
                login: login.to_string(),
                token,
            },
            (None, Some(token)) => Auth::Bearer(token),
            (Some(login), None) => {
                warn!("login '{login}' given without a token; connecting anonymously");
                Auth::Anonymous
            }
            (None, None) => Auth::Anonymous,
        };
        if matches!(auth, Auth::Anonymous) {
            warn!("unauthenticated GitHub access is limited to 60 requests per hour");
        }

        Ok(Self {
            client,
            base: settings.api_url.trim_end_matches('/').to_string(),
            auth,
            requests: Cell::new(0),
        })
    }

    /// Requests actually sent, including pagination and the free rate-limit probe.
    pub fn requests_sent(&self) -> u64 {
        self.requests.get()
    }

    fn url(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            return path_or_url.to_string();
        }
        format!("{}/{}", self.base, path_or_url.trim_start_matches('/'))
    }

    fn send(&self, url: &str) -> Result<Response> {
        let mut req = self.client.get(url);
        req = match &self.auth {
            Auth::Anonymous => req,
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic { login, token } => req.basic_auth(login, Some(token)),
        };
        self.requests.set(self.requests.get() + 1);
        debug!(url, "GET");
        req.send()
            .map_err(|e| Error::msg(format!("GET {url} failed: {e}")))
    }

    fn fail(url: &str, res: Response) -> Error {
        let status = res.status();
        let exhausted = res
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        if exhausted && (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
        {
            return Error::msg(format!("GET {url}: GitHub rate limit exhausted"));
        }
        let body = res.text().unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        Error::msg(format!("GET {url} failed with status {status}: {snippet}"))
    }

    /// Single object; 404 maps to `None`.
    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.url(path);
        let res = self.send(&url)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(Self::fail(&url, res));
        }
        let v = res
            .json::<T>()
            .map_err(|e| Error::msg(format!("failed to decode {url}: {e}")))?;
        Ok(Some(v))
    }

    /// Every page of a listing, following `Link: rel="next"`.
    fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut next = Some(with_per_page(&self.url(path)));
        let mut out = Vec::new();
        let mut pages = 0usize;
        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(Error::msg(format!(
                    "GET {path}: more than {MAX_PAGES} pages"
                )));
            }
            let res = self.send(&url)?;
            if !res.status().is_success() {
                return Err(Self::fail(&url, res));
            }
            next = res
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);
            let page = res
                .json::<Vec<T>>()
                .map_err(|e| Error::msg(format!("failed to decode {url}: {e}")))?;
            out.extend(page);
        }
        Ok(out)
    }
}

fn with_per_page(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}per_page={PER_PAGE}")
}

fn next_link(header: &str) -> Option<String> {
    static NEXT: OnceLock<Regex> = OnceLock::new();
    let re = NEXT.get_or_init(|| {
        Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).expect("static regex")
    });
    re.captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl RemoteSource for GithubClient {
    fn remaining_quota(&self) -> Result<i64> {
        let doc: RateLimitDoc = self
            .get_json("rate_limit")?
            .ok_or_else(|| Error::msg("rate limit endpoint not found"))?;
        Ok(doc.rate.remaining)
    }

    fn user(&self, login: &str) -> Result<Option<User>> {
        self.get_json(&format!("users/{login}"))
    }

    fn repository(&self, repo: &RepoName) -> Result<Option<Repository>> {
        self.get_json(&format!("repos/{repo}"))
    }

    fn followers(&self, login: &str) -> Result<Vec<UserRef>> {
        self.get_list(&format!("users/{login}/followers"))
    }

    fn following(&self, login: &str) -> Result<Vec<UserRef>> {
        self.get_list(&format!("users/{login}/following"))
    }

    fn organizations(&self, login: &str) -> Result<Vec<Organization>> {
        self.get_list(&format!("users/{login}/orgs"))
    }

    fn collaborators(&self, repo: &RepoName) -> Result<Vec<UserRef>> {
        self.get_list(&format!("repos/{repo}/collaborators"))
    }

    fn issues(&self, repo: &RepoName, state: IssueState) -> Result<Vec<Issue>> {
        let all: Vec<Issue> = self.get_list(&format!("repos/{repo}/issues?state={state}"))?;
        Ok(all
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .collect())
    }

    fn issue_comments(&self, repo: &RepoName, number: u64) -> Result<Vec<Comment>> {
        self.get_list(&format!("repos/{repo}/issues/{number}/comments"))
    }

    fn pull_requests(&self, repo: &RepoName, state: IssueState) -> Result<Vec<PullRequest>> {
        self.get_list(&format!("repos/{repo}/pulls?state={state}"))
    }

    fn pull_merged(&self, repo: &RepoName, number: u64) -> Result<bool> {
        let url = self.url(&format!("repos/{repo}/pulls/{number}/merge"));
        let res = self.send(&url)?;
        match res.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::fail(&url, res)),
        }
    }

    fn hooks(&self, repo: &RepoName) -> Result<Vec<Hook>> {
        self.get_list(&format!("repos/{repo}/hooks"))
    }

    fn teams(&self, repo: &RepoName) -> Result<Vec<Team>> {
        self.get_list(&format!("repos/{repo}/teams"))
    }

    fn team_members(&self, team: &Team) -> Result<Vec<UserRef>> {
        // members_url is a URI template: ".../members{/member}".
        let path = match team.members_url.as_deref() {
            Some(url) => url.split('{').next().unwrap_or(url).to_string(),
            None => format!("teams/{}/members", team.id),
        };
        self.get_list(&path)
    }

    fn commit_comments(&self, repo: &RepoName) -> Result<Vec<CommitComment>> {
        self.get_list(&format!("repos/{repo}/comments"))
    }

    fn milestones(&self, repo: &RepoName, state: IssueState) -> Result<Vec<Milestone>> {
        self.get_list(&format!("repos/{repo}/milestones?state={state}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    struct Canned {
        status: &'static str,
        headers: Vec<String>,
        body: String,
    }

    fn ok(body: &str) -> Canned {
        Canned {
            status: "200 OK",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    // Serves canned responses keyed by request path (query string included).
    fn spawn_stub(
        routes: BTreeMap<String, Canned>,
        request_limit: usize,
    ) -> (String, Arc<Mutex<Vec<String>>>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_srv = Arc::clone(&seen);
        let handle = thread::spawn(move || {
            for _ in 0..request_limit {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut buf = [0u8; 8192];
                let n = stream.read(&mut buf).expect("read request");
                let req = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = req
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                seen_srv.lock().expect("lock").push(req.clone());
                let resp = match routes.get(&path) {
                    Some(c) => {
                        let mut hdr = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                            c.status,
                            c.body.len()
                        );
                        for h in &c.headers {
                            hdr.push_str(h);
                            hdr.push_str("\r\n");
                        }
                        format!("{hdr}\r\n{}", c.body)
                    }
                    None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string(),
                };
                let _ = stream.write_all(resp.as_bytes());
            }
        });
        (format!("http://{addr}"), seen, handle)
    }

    fn settings(base: &str, token: Option<&str>) -> GithubSettings {
        GithubSettings {
            api_url: base.to_string(),
            token: token.map(str::to_string),
            token_env: None,
            ..GithubSettings::default()
        }
    }

    #[test]
    fn next_link_picks_the_next_relation() {
        let h = r#"<https://api.github.com/x?page=1>; rel="prev", <https://api.github.com/x?page=3>; rel="next", <https://api.github.com/x?page=9>; rel="last""#;
        assert_eq!(
            next_link(h).as_deref(),
            Some("https://api.github.com/x?page=3")
        );
        assert!(next_link(r#"<https://a/x?page=1>; rel="first""#).is_none());
    }

    #[test]
    fn listing_follows_pagination_and_sends_token() {
        // Relative next link: the stub's address is unknown until bind.
        let mut routes = BTreeMap::new();
        routes.insert(
            "/users/octo/followers?per_page=100".to_string(),
            Canned {
                status: "200 OK",
                headers: vec!["Link: </users/octo/followers?per_page=100&page=2>; rel=\"next\"".into()],
                body: r#"[{"login":"a","id":1}]"#.into(),
            },
        );
        routes.insert(
            "/users/octo/followers?per_page=100&page=2".to_string(),
            ok(r#"[{"login":"b","id":2}]"#),
        );
        let (base, seen, handle) = spawn_stub(routes, 2);
        let client = GithubClient::new(&settings(&base, Some("sekrit"))).expect("client");

        let followers = client.followers("octo").expect("followers");
        handle.join().expect("join");

        assert_eq!(
            followers.iter().map(|u| u.login.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(client.requests_sent(), 2);
        let seen = seen.lock().expect("lock");
        assert!(
            seen[0].to_ascii_lowercase().contains("authorization: bearer sekrit"),
            "missing auth header: {}",
            seen[0]
        );
    }

    #[test]
    fn missing_objects_and_unmerged_pulls_map_to_not_found() {
        let mut routes = BTreeMap::new();
        routes.insert(
            "/rate_limit".to_string(),
            ok(r#"{"resources":{},"rate":{"limit":5000,"remaining":4321}}"#),
        );
        let (base, _seen, handle) = spawn_stub(routes, 3);
        let client = GithubClient::new(&settings(&base, None)).expect("client");

        assert_eq!(client.remaining_quota().expect("quota"), 4321);
        assert!(client.user("ghost").expect("user").is_none());
        assert!(
            !client
                .pull_merged(&RepoName::new("o", "r"), 9)
                .expect("merged")
        );
        handle.join().expect("join");
    }

    #[test]
    fn exhausted_rate_limit_is_reported() {
        let mut routes = BTreeMap::new();
        routes.insert(
            "/repos/o/r/hooks?per_page=100".to_string(),
            Canned {
                status: "403 Forbidden",
                headers: vec!["X-RateLimit-Remaining: 0".into()],
                body: r#"{"message":"API rate limit exceeded"}"#.into(),
            },
        );
        let (base, _seen, handle) = spawn_stub(routes, 1);
        let client = GithubClient::new(&settings(&base, None)).expect("client");
        let err = client
            .hooks(&RepoName::new("o", "r"))
            .unwrap_err()
            .to_string();
        handle.join().expect("join");
        assert!(err.contains("rate limit exhausted"), "unexpected err: {err}");
    }

    #[test]
    fn issue_listing_drops_pull_requests() {
        let mut routes = BTreeMap::new();
        routes.insert(
            "/repos/o/r/issues?state=open&per_page=100".to_string(),
            ok(r#"[
                {"number":1,"title":"bug","body":"x","state":"open","labels":[]},
                {"number":2,"title":"pr","body":null,"state":"open","pull_request":{"url":"u"}}
            ]"#),
        );
        let (base, _seen, handle) = spawn_stub(routes, 1);
        let client = GithubClient::new(&settings(&base, None)).expect("client");
        let issues = client
            .issues(&RepoName::new("o", "r"), IssueState::Open)
            .expect("issues");
        handle.join().expect("join");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].number, 1);
    }
}
