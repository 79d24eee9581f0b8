//! Success and cancel redirect URLs for hosted checkout.
//!
//! The provider sends the browser back to the storefront root with
//! `?success=true` after payment; the storefront shows its confirmation view
//! and strips the marker again.

use url::Url;

pub const SUCCESS_PARAM: &str = "success";

/// Storefront URL the provider redirects to after payment.
pub fn success_url(origin: &str) -> String {
    match Url::parse(origin) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(SUCCESS_PARAM, "true");
            url.to_string()
        }
        Err(_) => format!("{}?{}=true", origin, SUCCESS_PARAM),
    }
}

/// Storefront URL the provider redirects to when the shopper backs out.
pub fn cancel_url(origin: &str) -> String {
    origin.to_string()
}

pub fn is_checkout_success(url: &str) -> bool {
    Url::parse(url)
        .map(|u| {
            u.query_pairs()
                .any(|(k, v)| k == SUCCESS_PARAM && v == "true")
        })
        .unwrap_or(false)
}

/// Removes the success marker and leaves any other query parameters intact.
pub fn strip_success_marker(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != SUCCESS_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_url_appends_marker() {
        assert_eq!(
            success_url("https://shop.example"),
            "https://shop.example/?success=true"
        );
        assert_eq!(
            success_url("http://localhost:5173"),
            "http://localhost:5173/?success=true"
        );
    }

    #[test]
    fn cancel_url_is_the_origin() {
        assert_eq!(cancel_url("https://shop.example"), "https://shop.example");
    }

    #[test]
    fn detects_marker() {
        assert!(is_checkout_success("https://shop.example/?success=true"));
        assert!(is_checkout_success("https://shop.example/?ref=ig&success=true"));
        assert!(!is_checkout_success("https://shop.example/?success=false"));
        assert!(!is_checkout_success("https://shop.example/"));
        assert!(!is_checkout_success("not a url"));
    }

    #[test]
    fn strips_marker_only() {
        assert_eq!(
            strip_success_marker("https://shop.example/?success=true"),
            "https://shop.example/"
        );
        assert_eq!(
            strip_success_marker("https://shop.example/?ref=ig&success=true"),
            "https://shop.example/?ref=ig"
        );
        assert_eq!(strip_success_marker("not a url"), "not a url");
    }
}
