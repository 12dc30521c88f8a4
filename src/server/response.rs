use crate::firewall::ValidationReport;
use may_minihttp::Response;
use tracing::error;

pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Status line only, empty body.
pub fn write_empty(res: &mut Response, status: u16) {
    res.status_code(status as usize, status_reason(status));
    res.body_vec(Vec::new());
}

/// `200` with the report as JSON.
pub fn write_report(res: &mut Response, report: &ValidationReport) {
    match serde_json::to_vec(report) {
        Ok(body) => {
            res.status_code(200, "OK");
            res.header("Content-Type: application/json");
            res.body_vec(body);
        }
        Err(e) => {
            error!(error = %e, "failed to serialize validation report");
            write_empty(res, 500);
        }
    }
}

/// `{"status": ...}` probe answer.
pub fn write_probe(res: &mut Response, status: u16, state: &str) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    res.body_vec(serde_json::json!({ "status": state }).to_string().into_bytes());
}
