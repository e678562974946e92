use std::path::{Path, PathBuf};

use super::{StageFailure, StageResult};
use crate::utils::id_file_stem;

/// Publishes a transcript as a minimal static HTML page
pub struct HtmlRenderer {
    output_dir: PathBuf,
}

impl HtmlRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `<output_dir>/<id>.html` and return the link stored in the ledger
    ///
    /// The link is the file name relative to the output directory.
    pub async fn render(&self, item_id: &str, title: &str, text: &str) -> StageResult<String> {
        let link = format!("{}.html", id_file_stem(item_id));
        let path = self.output_dir.join(&link);

        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            StageFailure::render(format!(
                "could not create {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        tokio::fs::write(&path, document(title, text))
            .await
            .map_err(|e| StageFailure::render(format!("could not write {}: {}", path.display(), e)))?;

        tracing::debug!("Rendered transcript to {}", path.display());
        Ok(link)
    }
}

fn document(title: &str, text: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n\
         <body>\n<main>\n<h1>{title}</h1>\n<pre>{body}</pre>\n</main>\n</body>\n\
         </html>\n",
        title = title,
        body = escape_html(text)
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
