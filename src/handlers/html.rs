use std::borrow::Cow;
use std::fmt::Write;

use axum::{
    extract::{Query, State},
    response::Html,
};

use crate::metrics::report::{HEADER, NUMERIC_COLUMNS};
use crate::metrics::{AccessProf, Report};

use super::report::build_report;
use super::{AppError, ReportQuery};

// ─── GET {report}/html ───────────────────────────────────────────
/// Browser view of the report: the table, an `agg` form that reloads the
/// page with new patterns and a Reset button that sends `DELETE` to the
/// same URL.

pub async fn get_report_html(
    State(prof): State<AccessProf>,
    Query(query): Query<ReportQuery>,
) -> Result<Html<String>, AppError> {
    let agg = query.agg.clone().unwrap_or_default();
    let report = build_report(prof, query).await?;
    Ok(Html(render(&report, &agg)))
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8">
    <title>accessprof</title>
    <style>
      body { font-family: sans-serif; margin: 1.5em; }
      table { border-collapse: collapse; margin: 1em 0; }
      th, td { border: 1px solid #ccc; padding: 4px 8px; }
      th { background: #f3f3f3; }
      td.num { text-align: right; font-family: monospace; }
      #reset { color: #fff; background: #c9302c; border: 0; padding: 4px 12px; }
    </style>
  </head>
  <body>
"#;

const PAGE_TAIL: &str = r#"    <script>
      document.getElementById("reset").addEventListener("click", function () {
        fetch(window.location.pathname, { method: "DELETE" })
          .then(function () { window.location.reload(); });
      });
    </script>
  </body>
</html>
"#;

fn render(report: &Report, agg: &str) -> String {
    let since = report
        .since()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".into());

    let mut page = String::from(PAGE_HEAD);
    // Writing into a String cannot fail
    let _ = writeln!(
        page,
        "    <p>{} requests (since {})</p>",
        report.total_requests(),
        escape(&since)
    );

    page.push_str("    <table id=\"profile-table\">\n      <thead><tr>");
    for title in HEADER {
        let _ = write!(page, "<th>{}</th>", escape(title));
    }
    page.push_str("</tr></thead>\n      <tbody>\n");
    for row in report.rows() {
        page.push_str("        <tr>");
        for (idx, cell) in row.iter().enumerate() {
            let class = if NUMERIC_COLUMNS.contains(&idx) { " class=\"num\"" } else { "" };
            let _ = write!(page, "<td{class}>{}</td>", escape(cell));
        }
        page.push_str("</tr>\n");
    }
    page.push_str("      </tbody>\n    </table>\n");

    let _ = writeln!(
        page,
        "    <form method=\"get\">\n      \
         <input type=\"text\" name=\"agg\" size=\"60\" placeholder=\"/users/\\d+,/.*\\.png\" value=\"{}\">\n      \
         <input type=\"submit\" value=\"Go\">\n    </form>\n    \
         <p><button id=\"reset\" type=\"button\">Reset</button></p>",
        escape(agg)
    );

    page.push_str(PAGE_TAIL);
    page
}

fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
