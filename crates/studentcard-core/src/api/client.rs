//! API client for the student card REST backend.
//!
//! This module provides the `ApiClient` struct for authenticated requests
//! against the dashboard endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{header, multipart, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::auth::SessionData;
use crate::models::card::QrVerificationRequest;
use crate::models::{
    DashboardStats, GenerationJob, ImportJob, LoginResponse, NewStudent, ProgramList,
    QrVerification, Student, User,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of every versioned endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Endpoint path of the per-student card data, below [`API_PREFIX`].
pub const STUDENT_CARDS_PATH: &str = "/cards/students/";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const NO_QUERY: [(&str, &str); 0] = [];

/// Filters of the student list. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilter {
    pub search: Option<String>,
    pub program: Option<String>,
    pub is_active: Option<bool>,
}

impl StudentFilter {
    fn query(&self) -> Vec<(&'static str, String)> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        let mut query = Vec::new();
        if let Some(search) = non_empty(&self.search) {
            query.push(("search", search));
        }
        if let Some(program) = non_empty(&self.program) {
            query.push(("program", program));
        }
        if let Some(active) = self.is_active {
            query.push(("is_active", active.to_string()));
        }
        query
    }
}

/// URL of a versioned endpoint. The base may carry a path prefix
/// (`https://school.example/backend`); it is kept.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}{}{}", base_url.trim_end_matches('/'), API_PREFIX, path)
}

/// API client for the student card backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client for a backend host such as `https://backend.example`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        endpoint_url(&self.base_url, path)
    }

    /// Log in with the OAuth2 password flow and return session data
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<SessionData> {
        let url = self.endpoint("/auth/login");

        let response = self
            .client
            .post(&url)
            .form(&[("username", email), ("password", password)])
            .send()
            .await
            .context("Failed to send login request")?;

        let status = response.status().as_u16();
        if status == 400 || status == 401 {
            return Err(ApiError::InvalidCredentials.into());
        }
        let response = Self::check_response(response).await?;

        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        Ok(SessionData {
            token: login.access_token,
            email: email.to_string(),
            created_at: Utc::now(),
        })
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned, Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<T> {
        let url = self.endpoint(path);
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.endpoint(path);
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = Self::check_response(response).await?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", url))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send POST request to {}", url))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    // ===== Data Fetching Methods =====

    /// Fetch the account behind the current token
    pub async fn current_user(&self) -> Result<User> {
        self.get("/users/me", &NO_QUERY).await
    }

    /// Fetch the counters and recent activity shown on the dashboard home
    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.get("/statistics/dashboard", &NO_QUERY).await
    }

    /// List students matching the filter
    pub async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>> {
        let students: Vec<Student> = self.get("/students/", &filter.query()).await?;
        debug!(count = students.len(), "Fetched students");
        Ok(students)
    }

    pub async fn get_student(&self, id: i64) -> Result<Student> {
        self.get(&format!("/students/{}", id), &NO_QUERY).await
    }

    pub async fn create_student(&self, student: &NewStudent) -> Result<Student> {
        let created: Student = self.post("/students/", student).await?;
        debug!(id = created.id, matricule = %created.matricule, "Created student");
        Ok(created)
    }

    /// Distinct program names, for filtering the student list
    pub async fn list_programs(&self) -> Result<Vec<String>> {
        let list: ProgramList = self.get("/students/programs/list", &NO_QUERY).await?;
        Ok(list.programs)
    }

    /// Card generation jobs, most recent first as returned by the backend
    pub async fn list_jobs(&self) -> Result<Vec<GenerationJob>> {
        self.get("/jobs/", &NO_QUERY).await
    }

    pub async fn list_imports(&self) -> Result<Vec<ImportJob>> {
        self.get("/imports/", &NO_QUERY).await
    }

    /// Upload a CSV of students for bulk import
    pub async fn upload_import(&self, file_name: &str, contents: Vec<u8>) -> Result<ImportJob> {
        let url = self.endpoint("/imports/upload-csv");
        let part = multipart::Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", file_name))?;

        let response = Self::check_response(response).await?;
        let result: ImportJob = response
            .json()
            .await
            .context("Failed to parse import result")?;
        debug!(
            file = file_name,
            total = result.total_rows,
            imported = result.successful_rows,
            "Uploaded import"
        );
        Ok(result)
    }

    /// The CSV header template expected by `upload_import`
    pub async fn download_import_template(&self) -> Result<String> {
        self.get_text("/imports/template/download").await
    }

    /// Dashboard accounts (admin only)
    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.get("/users/", &NO_QUERY).await
    }

    /// Check a scanned QR payload against the backend's signature
    pub async fn verify_qr(&self, qr_content: &str) -> Result<QrVerification> {
        self.post("/cards/verify", &QrVerificationRequest { qr_content })
            .await
    }
}
