use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::{DocumentHandle, DocumentService, ExportFormat};

/// Google Docs + Drive client. The template is copied through Drive for
/// every run; sections are inserted with Docs `batchUpdate`; the copy is
/// exported through Drive.
pub struct GoogleDocsService {
    client: reqwest::Client,
    access_token: String,
    docs_api_base: String,
    drive_api_base: String,
    insertion_marker: Option<String>,
    document_title: String,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct Document {
    body: Body,
}

#[derive(Deserialize)]
struct Body {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuralElement {
    end_index: Option<u64>,
    paragraph: Option<Paragraph>,
}

#[derive(Deserialize)]
struct Paragraph {
    #[serde(default)]
    elements: Vec<ParagraphElement>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphElement {
    text_run: Option<TextRun>,
}

#[derive(Deserialize)]
struct TextRun {
    content: Option<String>,
}

impl Paragraph {
    fn text(&self) -> String {
        self.elements
            .iter()
            .filter_map(|e| e.text_run.as_ref()?.content.as_deref())
            .collect()
    }
}

/// Index new sections are inserted at: just before the newline that closes
/// the marker paragraph, or the body's final newline when no marker is set.
fn insertion_index(doc: &Document, marker: Option<&str>) -> Option<u64> {
    let end = match marker {
        Some(marker) => doc.body.content.iter().find_map(|element| {
            let paragraph = element.paragraph.as_ref()?;
            if paragraph.text().contains(marker) {
                element.end_index
            } else {
                None
            }
        })?,
        None => doc.body.content.iter().filter_map(|e| e.end_index).max()?,
    };
    Some(end.saturating_sub(1).max(1))
}

/// Length of `text` in Docs index units (UTF-16 code units).
fn index_len(text: &str) -> u64 {
    text.encode_utf16().count() as u64
}

async fn ensure_success(response: reqwest::Response, api: &str) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("{api} API error ({status}): {body}")
}

impl GoogleDocsService {
    pub fn new(
        access_token: &str,
        docs_api_base: &str,
        drive_api_base: &str,
        insertion_marker: Option<String>,
        document_title: &str,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            access_token: access_token.to_string(),
            docs_api_base: docs_api_base.trim_end_matches('/').to_string(),
            drive_api_base: drive_api_base.trim_end_matches('/').to_string(),
            insertion_marker,
            document_title: document_title.to_string(),
        })
    }

    async fn copy_template(&self, template_id: &str) -> anyhow::Result<String> {
        let name = format!(
            "{} {}",
            self.document_title,
            chrono::Local::now().format("%Y-%m-%d %H:%M")
        );
        let response = self
            .client
            .post(format!("{}/files/{template_id}/copy", self.drive_api_base))
            .bearer_auth(&self.access_token)
            .query(&[("supportsAllDrives", "true")])
            .json(&json!({ "name": name }))
            .send()
            .await?;
        let file: DriveFile = ensure_success(response, "Google Drive").await?.json().await?;
        Ok(file.id)
    }

    async fn get_document(&self, document_id: &str) -> anyhow::Result<Document> {
        let response = self
            .client
            .get(format!("{}/documents/{document_id}", self.docs_api_base))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(ensure_success(response, "Google Docs").await?.json().await?)
    }
}

#[async_trait::async_trait]
impl DocumentService for GoogleDocsService {
    #[tracing::instrument(name = "google_docs.open_template", skip(self), fields(document.id))]
    async fn open_template(&self, template_id: &str) -> anyhow::Result<DocumentHandle> {
        let document_id = self.copy_template(template_id).await?;
        tracing::Span::current().record("document.id", document_id.as_str());

        let mut handle = DocumentHandle {
            template_id: template_id.to_string(),
            document_id,
            insertion_index: 1,
        };

        let located = match self.get_document(&handle.document_id).await {
            Ok(doc) => insertion_index(&doc, self.insertion_marker.as_deref()).ok_or_else(|| {
                match &self.insertion_marker {
                    Some(marker) => anyhow::anyhow!("insertion marker '{marker}' not found in template"),
                    None => anyhow::anyhow!("template body has no content"),
                }
            }),
            Err(err) => Err(err),
        };

        match located {
            Ok(index) => {
                handle.insertion_index = index;
                Ok(handle)
            }
            Err(err) => {
                if let Err(discard_err) = self.discard(&handle).await {
                    tracing::warn!(error = %discard_err, "Failed to remove working copy");
                }
                Err(err)
            }
        }
    }

    async fn append_text(&self, handle: &mut DocumentHandle, text: &str) -> anyhow::Result<()> {
        let body = json!({
            "requests": [{
                "insertText": {
                    "location": { "index": handle.insertion_index },
                    "text": text,
                }
            }]
        });

        let response = self
            .client
            .post(format!(
                "{}/documents/{}:batchUpdate",
                self.docs_api_base, handle.document_id
            ))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        ensure_success(response, "Google Docs").await?;

        handle.insertion_index += index_len(text);
        Ok(())
    }

    #[tracing::instrument(
        name = "google_drive.export",
        skip(self, handle),
        fields(document.id = %handle.document_id, export.bytes)
    )]
    async fn export(
        &self,
        handle: &DocumentHandle,
        format: ExportFormat,
    ) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(format!(
                "{}/files/{}/export",
                self.drive_api_base, handle.document_id
            ))
            .bearer_auth(&self.access_token)
            .query(&[("mimeType", format.mime_type())])
            .send()
            .await?;
        let bytes = ensure_success(response, "Google Drive").await?.bytes().await?;

        tracing::Span::current().record("export.bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn discard(&self, handle: &DocumentHandle) -> anyhow::Result<()> {
        let response = self
            .client
            .delete(format!(
                "{}/files/{}",
                self.drive_api_base, handle.document_id
            ))
            .bearer_auth(&self.access_token)
            .query(&[("supportsAllDrives", "true")])
            .send()
            .await?;
        ensure_success(response, "Google Drive").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query, State};
    use axum::http::{StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::Value;

    use super::*;

    fn document(json: &str) -> Document {
        serde_json::from_str(json).unwrap()
    }

    const TEMPLATE: &str = r#"{
        "body": {
            "content": [
                {"endIndex": 1, "sectionBreak": {}},
                {"startIndex": 1, "endIndex": 26, "paragraph": {"elements": [
                    {"startIndex": 1, "endIndex": 26, "textRun": {"content": "Tree Risk Assessment 2026\n"}}
                ]}},
                {"startIndex": 26, "endIndex": 41, "paragraph": {"elements": [
                    {"startIndex": 26, "endIndex": 35, "textRun": {"content": "{{FIND"}},
                    {"startIndex": 35, "endIndex": 41, "textRun": {"content": "INGS}}\n"}}
                ]}},
                {"startIndex": 41, "endIndex": 60, "paragraph": {"elements": [
                    {"startIndex": 41, "endIndex": 60, "textRun": {"content": "Signed: Arborist\n"}}
                ]}}
            ]
        }
    }"#;

    #[test]
    fn test_insertion_index_defaults_to_document_end() {
        assert_eq!(insertion_index(&document(TEMPLATE), None), Some(59));
    }

    #[test]
    fn test_insertion_index_after_marker_paragraph() {
        // Marker text split across two runs still matches.
        assert_eq!(
            insertion_index(&document(TEMPLATE), Some("{{FINDINGS}}")),
            Some(40)
        );
    }

    #[test]
    fn test_missing_marker() {
        assert_eq!(insertion_index(&document(TEMPLATE), Some("{{NOPE}}")), None);
    }

    #[test]
    fn test_empty_document() {
        let doc = document(r#"{"body": {"content": [{"endIndex": 1, "sectionBreak": {}}]}}"#);
        assert_eq!(insertion_index(&doc, None), Some(1));

        let doc = document(r#"{"body": {}}"#);
        assert_eq!(insertion_index(&doc, None), None);
    }

    #[test]
    fn test_index_len_counts_utf16_units() {
        assert_eq!(index_len("\nOak"), 4);
        assert_eq!(index_len("é"), 1);
        assert_eq!(index_len("🌳"), 2);
    }

    #[derive(Clone, Default)]
    struct Stub {
        inserts: Arc<Mutex<Vec<(u64, String)>>>,
        deleted: Arc<Mutex<Vec<String>>>,
    }

    async fn copy_file(Path(id): Path<String>) -> Response {
        if id == "denied" {
            return (StatusCode::FORBIDDEN, "The caller does not have permission").into_response();
        }
        Json(json!({"id": "copy-1"})).into_response()
    }

    async fn get_document(Path(id): Path<String>) -> Response {
        if id != "copy-1" {
            return StatusCode::NOT_FOUND.into_response();
        }
        ([(header::CONTENT_TYPE, "application/json")], TEMPLATE).into_response()
    }

    async fn batch_update(
        State(stub): State<Stub>,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> Response {
        if id != "copy-1:batchUpdate" {
            return (StatusCode::NOT_FOUND, "Requested entity was not found").into_response();
        }
        let insert = &body["requests"][0]["insertText"];
        stub.inserts.lock().unwrap().push((
            insert["location"]["index"].as_u64().unwrap(),
            insert["text"].as_str().unwrap().to_string(),
        ));
        Json(json!({"documentId": "copy-1"})).into_response()
    }

    async fn delete_file(State(stub): State<Stub>, Path(id): Path<String>) -> StatusCode {
        stub.deleted.lock().unwrap().push(id);
        StatusCode::NO_CONTENT
    }

    async fn export_file(
        Path(id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        if query.get("mimeType").map(String::as_str) != Some("application/pdf") {
            return StatusCode::BAD_REQUEST.into_response();
        }
        format!("%PDF-1.7 {id}").into_response()
    }

    async fn service(marker: Option<&str>) -> (GoogleDocsService, Stub) {
        let stub = Stub::default();
        let app = Router::new()
            .route("/drive/files/{id}/copy", post(copy_file))
            .route("/drive/files/{id}/export", get(export_file))
            .route("/drive/files/{id}", delete(delete_file))
            .route("/docs/documents/{id}", get(get_document).post(batch_update))
            .with_state(stub.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let service = GoogleDocsService::new(
            "ya29.token",
            &format!("http://{addr}/docs"),
            &format!("http://{addr}/drive/"),
            marker.map(str::to_string),
            "Tree Risk Assessment Report",
        )
        .unwrap();
        (service, stub)
    }

    #[tokio::test]
    async fn test_appends_advance_insertion_point() {
        let (docs, stub) = service(Some("{{FINDINGS}}")).await;

        let mut handle = docs.open_template("template-1").await.unwrap();
        assert_eq!(handle.document_id, "copy-1");
        assert_eq!(handle.insertion_index, 40);

        docs.append_text(&mut handle, "\nOak: low risk").await.unwrap();
        docs.append_text(&mut handle, "\nÉrable 🌳").await.unwrap();

        let inserts = stub.inserts.lock().unwrap().clone();
        assert_eq!(
            inserts,
            [
                (40, "\nOak: low risk".to_string()),
                (54, "\nÉrable 🌳".to_string()),
            ]
        );
        assert_eq!(handle.insertion_index, 54 + 10);
        assert!(stub.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_marker_discards_copy() {
        let (docs, stub) = service(Some("{{NOPE}}")).await;

        let err = docs.open_template("template-1").await.unwrap_err();
        assert!(err.to_string().contains("{{NOPE}}"));
        assert_eq!(*stub.deleted.lock().unwrap(), ["copy-1"]);
    }

    #[tokio::test]
    async fn test_copy_rejected() {
        let (docs, stub) = service(None).await;

        let err = docs.open_template("denied").await.unwrap_err().to_string();
        assert!(err.contains("403"), "{err}");
        assert!(err.contains("does not have permission"), "{err}");
        assert!(stub.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_append_keeps_cursor() {
        let (docs, _stub) = service(None).await;
        let mut handle = DocumentHandle {
            template_id: "template-1".to_string(),
            document_id: "gone".to_string(),
            insertion_index: 12,
        };

        let err = docs.append_text(&mut handle, "\nOak").await.unwrap_err();
        assert!(err.to_string().contains("404"));
        assert_eq!(handle.insertion_index, 12);
    }

    #[tokio::test]
    async fn test_export_pdf() {
        let (docs, _stub) = service(None).await;
        let mut handle = docs.open_template("template-1").await.unwrap();
        assert_eq!(handle.insertion_index, 59);
        docs.append_text(&mut handle, "\nOak").await.unwrap();

        let bytes = docs.export(&handle, ExportFormat::Pdf).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7 copy-1");
    }
}
