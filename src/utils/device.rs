// Device context attached to each refresh-token row.
//
// The fingerprint is sha256 over user-agent + accept-language + accept-encoding
// (missing headers count as empty strings). It identifies a browser profile,
// not a person, and is only used for session listing.

use actix_web::http::header::{HeaderName, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use actix_web::HttpRequest;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

const UNKNOWN: &str = "Unknown";
const OTHER: &str = "Other";

static RE_WINDOWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Windows NT (\d+\.\d+)").expect("windows pattern"));
static RE_ANDROID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Android (\d+(?:\.\d+)*)").expect("android pattern"));
static RE_IOS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:iPhone|CPU) OS (\d+)_(\d+)").expect("ios pattern"));
static RE_MACOS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Mac OS X (\d+)[_.](\d+)").expect("macos pattern"));
static RE_ANDROID_MODEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Android [^;)]*; ([^;)]+?)(?: Build/[^;)]*)?\)").expect("model pattern"));

/// Browser families in match order. Edge and Opera also carry a `Chrome/` token,
/// and Chrome carries `Safari/`, so the more specific entries come first.
static BROWSERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("Edge", r"Edg(?:e|A|iOS)?/([\d.]+)"),
        ("Opera", r"OPR/([\d.]+)"),
        ("Samsung Internet", r"SamsungBrowser/([\d.]+)"),
        ("Firefox", r"(?:Firefox|FxiOS)/([\d.]+)"),
        ("Chrome", r"(?:Chrome|CriOS)/([\d.]+)"),
        ("Safari", r"Version/([\d.]+).*Safari/"),
    ]
    .into_iter()
    .map(|(family, pattern)| (family, Regex::new(pattern).expect("browser pattern")))
    .collect()
});

/// Request headers and address a session is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceContext {
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub ip_address: Option<String>,
}

/// Classified user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub os: String,
    pub browser: String,
    pub device: String,
    pub is_mobile: bool,
}

impl DeviceContext {
    pub fn from_request(req: &HttpRequest) -> Self {
        Self {
            user_agent: header(req, &USER_AGENT),
            accept_language: header(req, &ACCEPT_LANGUAGE),
            accept_encoding: header(req, &ACCEPT_ENCODING),
            ip_address: client_ip(req),
        }
    }

    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.user_agent, &self.accept_language, &self.accept_encoding] {
            hasher.update(part.as_deref().unwrap_or_default().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn info(&self) -> DeviceInfo {
        classify(self.user_agent.as_deref().unwrap_or_default())
    }
}

fn header(req: &HttpRequest, name: &HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

/// Peer address first, then the first `X-Forwarded-For` hop, then `X-Real-IP`.
fn client_ip(req: &HttpRequest) -> Option<String> {
    if let Some(peer) = req.peer_addr() {
        return Some(peer.ip().to_string());
    }

    let headers = req.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
        .map(String::from)
}

pub fn classify(user_agent: &str) -> DeviceInfo {
    if user_agent.trim().is_empty() {
        return DeviceInfo {
            os: UNKNOWN.to_string(),
            browser: UNKNOWN.to_string(),
            device: UNKNOWN.to_string(),
            is_mobile: false,
        };
    }

    let is_ipad = user_agent.contains("iPad");
    let is_iphone = user_agent.contains("iPhone");
    let is_android = user_agent.contains("Android");

    let os = if let Some(caps) = RE_ANDROID.captures(user_agent) {
        format!("Android {}", &caps[1])
    } else if let Some(caps) = RE_IOS.captures(user_agent).filter(|_| is_iphone || is_ipad) {
        format!("iOS {}.{}", &caps[1], &caps[2])
    } else if let Some(caps) = RE_WINDOWS.captures(user_agent) {
        format!("Windows {}", windows_release(&caps[1]))
    } else if let Some(caps) = RE_MACOS.captures(user_agent) {
        format!("Mac OS X {}.{}", &caps[1], &caps[2])
    } else if user_agent.contains("CrOS") {
        "Chrome OS".to_string()
    } else if user_agent.contains("Linux") {
        "Linux".to_string()
    } else {
        OTHER.to_string()
    };

    let browser = BROWSERS
        .iter()
        .find_map(|(family, re)| re.captures(user_agent).map(|caps| format!("{family} {}", &caps[1])))
        .unwrap_or_else(|| OTHER.to_string());

    let device = if is_iphone {
        "iPhone".to_string()
    } else if is_ipad {
        "iPad".to_string()
    } else if is_android {
        RE_ANDROID_MODEL
            .captures(user_agent)
            .map(|caps| caps[1].trim().to_string())
            .filter(|model| !model.is_empty() && model != "K")
            .unwrap_or_else(|| "Generic Android".to_string())
    } else {
        OTHER.to_string()
    };

    let is_mobile = !is_ipad && (is_iphone || user_agent.contains("Mobi"));

    DeviceInfo { os, browser, device, is_mobile }
}

fn windows_release(nt_version: &str) -> &str {
    match nt_version {
        "10.0" => "10",
        "6.3" => "8.1",
        "6.2" => "8",
        "6.1" => "7",
        other => other,
    }
}
