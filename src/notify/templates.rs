//! HTML email bodies.

use std::path::Path;

use crate::models::{OutputKind, Request};

use super::report::ErrorReport;

/// Escape HTML special characters for safe rendering.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Render a bordered table. Cell text is escaped.
pub fn html_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut html = String::from("<table border=\"1\" cellpadding=\"4\" style=\"border-collapse: collapse\">\n<tr>");
    for header in headers {
        html.push_str(&format!("<th>{}</th>", html_escape(header)));
    }
    html.push_str("</tr>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", html_escape(cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>");
    html
}

/// Wrap paragraphs (already HTML) and an optional table in a document.
fn document(paragraphs: &[String], table: Option<&str>) -> String {
    let mut body = String::from("<html>\n<body>\n");
    for p in paragraphs {
        body.push_str(&format!("<p>{}</p>\n", p));
    }
    if let Some(table) = table {
        body.push_str(table);
        body.push_str("\n<br>\n");
    }
    body.push_str("<p>[This is an autogenerated email]</p>\n</body>\n</html>\n");
    body
}

fn link(href: &str) -> String {
    format!(
        "<a href=\"{}\">Click Here to View Files</a>",
        html_escape(href)
    )
}

fn records_sentence(files: Option<u64>) -> String {
    match files {
        Some(1) => " A total of 1 as-built record was found in the specified search area.".to_string(),
        Some(n) => format!(
            " A total of {} as-built records were found in the specified search area.",
            n
        ),
        None => String::new(),
    }
}

/// Details of a fulfilled request used by the completion emails.
#[derive(Debug, Clone)]
pub struct Completion {
    pub folder: String,
    pub link: String,
    pub outputs: Vec<OutputKind>,
    /// As-built file count, when the processor reported one.
    pub as_built_files: Option<u64>,
}

impl Completion {
    fn has(&self, kind: OutputKind) -> bool {
        self.outputs.contains(&kind)
    }
}

/// Subject and body for the requester.
pub fn requester_completed(request: &Request, completion: &Completion) -> (String, String) {
    let folder = html_escape(&completion.folder);
    let utilities = html_escape(
        &request
            .utility_set()
            .map(|set| set.to_string())
            .unwrap_or_else(|| request.utilities.clone()),
    );

    if !completion.has(OutputKind::AsBuilts) {
        return (
            "Your GIS Files Request has been Processed".to_string(),
            document(
                &[
                    format!("Your GIS files request [{}] has been processed.", folder),
                    link(&completion.link),
                    format!("Requested Utilities: {}", utilities),
                    "Thanks for using the As-Built / GIS File Downloader.".to_string(),
                ],
                None,
            ),
        );
    }

    let what = if completion.has(OutputKind::GisFiles) {
        "Please find the requested pdfs at the below link, as well as GIS files (shapefiles and Esri File Geodatabase)."
    } else {
        "Please find the requested pdfs at the below link."
    };
    (
        "Your As-Built Download Request Has Been Fulfilled".to_string(),
        document(
            &[
                format!(
                    "Your As-Built download request [{}] has been fulfilled.{}",
                    folder,
                    records_sentence(completion.as_built_files)
                ),
                format!("{} It may take several minutes for the files to upload.", what),
                link(&completion.link),
                format!("Requested Utilities: {}", utilities),
                "Thank you for using the As-Built Downloader.".to_string(),
            ],
            None,
        ),
    )
}

/// Subject and body for the admin when the requester is not approved.
pub fn unknown_requester(request: &Request, completion: &Completion) -> (String, String) {
    let rows: Vec<Vec<String>> = request
        .summary_rows()
        .into_iter()
        .map(|(k, v)| vec![k.to_string(), v])
        .collect();
    let table = html_table(&["Field", "Value"], &rows);

    (
        format!("! As-Built Requester Unknown: {}", request.email),
        document(
            &[
                format!(
                    "A download request has been submitted by an unknown user.{}",
                    records_sentence(completion.as_built_files)
                ),
                format!(
                    "The unknown user's email address is: {}",
                    html_escape(&request.email)
                ),
                "If this is a valid user, please forward the files to the appropriate recipient and add them to the approved list in config.json.".to_string(),
                "The requested files can be found at the following location:".to_string(),
                link(&completion.link),
            ],
            Some(&table),
        ),
    )
}

/// Subject and body for the end-of-run admin error report.
pub fn error_report(report: &ErrorReport, log_file: Option<&Path>) -> (String, String) {
    let rows: Vec<Vec<String>> = report
        .entries()
        .iter()
        .map(|e| {
            vec![
                e.number.to_string(),
                e.global_id.clone(),
                e.folder.clone(),
                e.email.clone(),
                e.utilities.clone(),
                e.message.clone(),
            ]
        })
        .collect();
    let table = html_table(
        &["Error Number", "GlobalID", "Folder", "Email", "Utilities", "Error Message"],
        &rows,
    );

    let log_line = match log_file {
        Some(path) => format!(
            "Check the log file for more details: {}",
            html_escape(&path.display().to_string())
        ),
        None => "Check the application log for more details.".to_string(),
    };

    (
        "Error in As-Built Downloader Script".to_string(),
        document(
            &[
                format!("{} error(s) occurred during this run.", report.len()),
                log_line,
            ],
            Some(&table),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request {
            global_id: "{A1}".to_string(),
            email: "engineer@city.gov".to_string(),
            folder_name: "Elm <Street>".to_string(),
            desired_output: "as_builts".to_string(),
            utilities: "Water,Storm".to_string(),
            ..Default::default()
        }
    }

    fn completion(outputs: Vec<OutputKind>, files: Option<u64>) -> Completion {
        Completion {
            folder: "Elm <Street>".to_string(),
            link: "https://city.sharepoint.com/Outputs/Elm%20Street".to_string(),
            outputs,
            as_built_files: files,
        }
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">R&D's</a>"),
            "&lt;a href=&quot;x&quot;&gt;R&amp;D&#39;s&lt;/a&gt;");
    }

    #[test]
    fn test_table_escapes_cells() {
        let table = html_table(&["A"], &[vec!["<b>".to_string()]]);
        assert!(table.contains("<th>A</th>"));
        assert!(table.contains("<td>&lt;b&gt;</td>"));
    }

    #[test]
    fn test_requester_as_builts() {
        let (subject, body) =
            requester_completed(&request(), &completion(vec![OutputKind::AsBuilts], Some(4)));
        assert_eq!(subject, "Your As-Built Download Request Has Been Fulfilled");
        assert!(body.contains("[Elm &lt;Street&gt;]"));
        assert!(body.contains("A total of 4 as-built records were found"));
        assert!(body.contains("href=\"https://city.sharepoint.com/Outputs/Elm%20Street\""));
        assert!(!body.contains("Esri File Geodatabase"));
    }

    #[test]
    fn test_requester_both_outputs() {
        let (_, body) = requester_completed(
            &request(),
            &completion(vec![OutputKind::AsBuilts, OutputKind::GisFiles], None),
        );
        assert!(body.contains("Esri File Geodatabase"));
        assert!(!body.contains("A total of"));
    }

    #[test]
    fn test_requester_gis_only() {
        let (subject, body) =
            requester_completed(&request(), &completion(vec![OutputKind::GisFiles], None));
        assert_eq!(subject, "Your GIS Files Request has been Processed");
        assert!(body.contains("Requested Utilities: Water,Storm"));
    }

    #[test]
    fn test_unknown_requester_has_table() {
        let (subject, body) =
            unknown_requester(&request(), &completion(vec![OutputKind::AsBuilts], Some(1)));
        assert_eq!(subject, "! As-Built Requester Unknown: engineer@city.gov");
        assert!(body.contains("<td>GlobalID</td><td>{A1}</td>"));
        assert!(body.contains("A total of 1 as-built record was found"));
    }
}
