//! HTML and JSON rendering of detection results.

use axum::http::header::ACCEPT;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};

use crate::error::ApiError;
use crate::services::DetectionOutcome;

/// Message shown on the HTML page when detection fails.
pub const DETECTION_FAILED_MESSAGE: &str = "Unexpected error occurred, detection terminated.";

/// Whether the client's `Accept` header ranks JSON strictly above HTML.
pub fn prefers_json(headers: &HeaderMap) -> bool {
    let accept = match headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
        Some(accept) => accept,
        None => return false,
    };

    quality_for(accept, "application", "json") > quality_for(accept, "text", "html")
}

/// Quality the `Accept` header gives a media type.
///
/// The most specific matching range wins: `type/subtype`, then `type/*`,
/// then `*/*`. Unmatched types get 0.
fn quality_for(accept: &str, type_: &str, subtype: &str) -> f32 {
    let mut best: Option<(u8, f32)> = None;

    for range in accept.split(',') {
        let mut parts = range.split(';');
        let media = parts.next().unwrap_or("").trim();
        let (range_type, range_subtype) = match media.split_once('/') {
            Some((t, s)) => (t.trim(), s.trim()),
            None => continue,
        };

        let specificity = if range_type.eq_ignore_ascii_case(type_) && range_subtype.eq_ignore_ascii_case(subtype) {
            3
        } else if range_type.eq_ignore_ascii_case(type_) && range_subtype == "*" {
            2
        } else if range_type == "*" && range_subtype == "*" {
            1
        } else {
            continue;
        };

        let quality = parts
            .filter_map(|p| p.trim().strip_prefix("q=").or_else(|| p.trim().strip_prefix("Q=")))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .map(|q| q.clamp(0.0, 1.0))
            .unwrap_or(1.0);

        if best.map_or(true, |(s, _)| specificity > s) {
            best = Some((specificity, quality));
        }
    }

    best.map(|(_, q)| q).unwrap_or(0.0)
}

/// Public URL of the image to show for a finished detection.
pub fn result_image_url(outcome: &DetectionOutcome) -> String {
    match &outcome.output_image {
        Some(name) => format!("/output/{}", name),
        None => format!("/uploads/{}", outcome.stored.storage_key),
    }
}

/// Report text as escaped HTML lines joined with `<br />`.
///
/// Blank lines are skipped and the header line loses everything up to its
/// first `:` (the detector prefixes it with the image path).
pub fn report_html(report: &str) -> String {
    let mut lines = Vec::new();

    for (idx, line) in report.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
        let line = if idx == 0 {
            line.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or(line)
        } else {
            line
        };
        lines.push(html_escape::encode_text(line).into_owned());
    }

    lines.join("<br />")
}

fn page(title: &str, body: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>");
    html.push_str(&html_escape::encode_text(title));
    html.push_str("</title>\n</head>\n<body>\n");
    html.push_str(body);
    html.push_str("\n</body>\n</html>\n");
    html
}

fn upload_form() -> &'static str {
    "<form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\n\
     <input type=\"file\" name=\"file\">\n\
     <input type=\"submit\" value=\"Upload\">\n\
     </form>"
}

/// Upload form page.
pub fn render_index(allowed_extensions: &[&str], max_upload_bytes: usize) -> Html<String> {
    let mut body = String::new();
    body.push_str("<h1>Object detection</h1>\n<p>Accepted formats: ");
    body.push_str(&html_escape::encode_text(&allowed_extensions.join(", ")));
    body.push_str(&format!(" (up to {} KiB)</p>\n", max_upload_bytes / 1024));
    body.push_str(upload_form());
    Html(page("Object detection", &body))
}

/// Result page for a finished detection.
pub fn render_result(outcome: &DetectionOutcome) -> Html<String> {
    let mut body = String::new();
    body.push_str("<h1>Detection result</h1>\n<img src=\"");
    body.push_str(&html_escape::encode_double_quoted_attribute(&result_image_url(outcome)));
    body.push_str("\" alt=\"detection result\">\n<p>");
    body.push_str(&report_html(&outcome.report));
    body.push_str("</p>\n");
    body.push_str(upload_form());
    Html(page("Detection result", &body))
}

/// Render an error for the negotiated content type.
///
/// Rejected uploads always get the plain-text body. `image_url` points at the
/// stored upload when the failure happened after it was persisted.
pub fn error_response(err: ApiError, wants_json: bool, production: bool, image_url: Option<&str>) -> Response {
    if wants_json || err.is_rejected_upload() {
        return err.to_response(production);
    }

    let mut body = String::new();
    body.push_str("<h1>Detection result</h1>\n");
    if let Some(url) = image_url {
        body.push_str("<img src=\"");
        body.push_str(&html_escape::encode_double_quoted_attribute(url));
        body.push_str("\" alt=\"uploaded image\">\n");
    }
    body.push_str("<p>");
    body.push_str(DETECTION_FAILED_MESSAGE);
    body.push_str("</p>\n<p>");
    body.push_str(&html_escape::encode_text(&err.public_detail(production)));
    body.push_str("</p>\n");
    body.push_str(upload_form());

    (err.status_code(), Html(page("Detection failed", &body))).into_response()
}
