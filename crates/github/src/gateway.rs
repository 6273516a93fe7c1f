//! [`RepositoryGateway`] over the GitHub REST API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

use reconciler::{
    CardId, CardPosition, Column, ColumnId, ColumnName, GatewayError, Issue, IssueId, IssueNumber,
    Label, LabelName, LookupCache, Project, ProjectCard, ProjectName, RepositoryGateway,
};

use crate::models::{
    CardWire, ColumnWire, CreateCardBody, IssueWire, LabelWire, MoveCardBody, ProjectWire,
    RateLimit, RateLimitWire, SetLabelsBody,
};
use crate::{ClientError, GitHubClient, GitHubConfig};

/// Gateway for one repository.
///
/// Projects and columns are served from the shared [`LookupCache`] once seen.
/// Issues and card listings are always fetched fresh.
#[derive(Debug, Clone)]
pub struct GitHubGateway {
    client: GitHubClient,
    owner: String,
    repo: String,
    cache: Arc<LookupCache>,
}

impl GitHubGateway {
    pub fn new(config: &GitHubConfig, cache: Arc<LookupCache>) -> Result<Self, ClientError> {
        Ok(Self {
            client: GitHubClient::new(config)?,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            cache,
        })
    }

    pub fn cache(&self) -> &Arc<LookupCache> {
        &self.cache
    }

    /// Reads the core API quota. Used as the startup connectivity check.
    pub async fn rate_limit(&self) -> Result<RateLimit, GatewayError> {
        let wire: RateLimitWire = self
            .client
            .get_json("rate limit", self.client.url(&["rate_limit"]))
            .await?;
        wire.into_rate_limit()
    }

    fn repo_url(&self, rest: &[&str]) -> reqwest::Url {
        let mut segments = vec!["repos", self.owner.as_str(), self.repo.as_str()];
        segments.extend_from_slice(rest);
        self.client.url(&segments)
    }

    async fn fetch_column(&self, id: ColumnId) -> Result<Column, GatewayError> {
        if let Some(column) = self.cache.column_by_id(id) {
            return Ok(column);
        }
        let id_segment = id.to_string();
        let wire: ColumnWire = self
            .client
            .get_json(
                "get column",
                self.client.url(&["projects", "columns", &id_segment]),
            )
            .await?;
        let column = wire.into_column()?;
        self.cache.insert_column_by_id(column.clone());
        Ok(column)
    }
}

#[async_trait]
impl RepositoryGateway for GitHubGateway {
    #[instrument(skip_all, fields(issue = %number))]
    async fn get_issue(&self, number: IssueNumber) -> Result<Issue, GatewayError> {
        let number_segment = number.to_string();
        let wire: IssueWire = self
            .client
            .get_json("get issue", self.repo_url(&["issues", &number_segment]))
            .await?;
        wire.into_issue()
    }

    async fn get_label(&self, name: &LabelName) -> Result<Label, GatewayError> {
        let wire: LabelWire = self
            .client
            .get_json("get label", self.repo_url(&["labels", name.as_str()]))
            .await?;
        wire.into_label()
    }

    async fn get_project(&self, name: &ProjectName) -> Result<Project, GatewayError> {
        if let Some(project) = self.cache.project(name) {
            return Ok(project);
        }

        let url = {
            let mut url = self.repo_url(&["projects"]);
            url.query_pairs_mut().append_pair("state", "open");
            url
        };
        let wires: Vec<ProjectWire> = self.client.get_paginated("list projects", url).await?;
        let mut found = None;
        for wire in wires {
            let project = wire.into_project()?;
            if found.is_none() && &project.name == name {
                found = Some(project.clone());
            }
            self.cache.insert_project(project);
        }
        // The first listed project wins; the cache keeps it for the process lifetime.
        match found {
            Some(project) => {
                self.cache.insert_project(project.clone());
                Ok(project)
            }
            None => Err(GatewayError::not_found(format!("project '{name}'"))),
        }
    }

    async fn get_project_columns(&self, project: &Project) -> Result<Vec<Column>, GatewayError> {
        let id_segment = project.id.to_string();
        let wires: Vec<ColumnWire> = self
            .client
            .get_paginated(
                "list columns",
                self.client.url(&["projects", &id_segment, "columns"]),
            )
            .await?;
        let columns = wires
            .into_iter()
            .map(ColumnWire::into_column)
            .collect::<Result<Vec<_>, _>>()?;
        for column in &columns {
            self.cache.insert_column(&project.name, column.clone());
        }
        Ok(columns)
    }

    async fn get_project_column(
        &self,
        project: &Project,
        name: &ColumnName,
    ) -> Result<Column, GatewayError> {
        if let Some(column) = self.cache.column(&project.name, name) {
            return Ok(column);
        }
        self.get_project_columns(project)
            .await?
            .into_iter()
            .find(|column| &column.name == name)
            .ok_or_else(|| {
                GatewayError::not_found(format!("column '{name}' in project '{}'", project.name))
            })
    }

    #[instrument(skip_all, fields(column = %column))]
    async fn get_project_cards(&self, column: ColumnId) -> Result<Vec<ProjectCard>, GatewayError> {
        let id_segment = column.to_string();
        let url = {
            let mut url = self.client.url(&["projects", "columns", &id_segment, "cards"]);
            url.query_pairs_mut()
                .append_pair("archived_state", "not_archived");
            url
        };
        let wires: Vec<CardWire> = self.client.get_paginated("list cards", url).await?;
        let cards: Vec<ProjectCard> = wires
            .into_iter()
            .map(|wire| wire.into_card_in(column))
            .collect();
        for card in &cards {
            self.cache.record_card(card.clone());
        }
        Ok(cards)
    }

    #[instrument(skip_all, fields(card = %card.id))]
    async fn get_card_column(&self, card: &ProjectCard) -> Result<Column, GatewayError> {
        let id_segment = card.id.to_string();
        let wire: CardWire = self
            .client
            .get_json(
                "get card",
                self.client.url(&["projects", "columns", "cards", &id_segment]),
            )
            .await?;
        let fresh = wire.into_card()?;
        if let Some(previous) = self.cache.record_card(fresh.clone()) {
            if previous.column_id != fresh.column_id {
                debug!(from = %previous.column_id, to = %fresh.column_id, "card changed column since last seen");
            }
        }
        self.fetch_column(fresh.column_id).await
    }

    #[instrument(skip_all, fields(issue = %number))]
    async fn set_issue_labels(
        &self,
        number: IssueNumber,
        labels: &[LabelName],
    ) -> Result<(), GatewayError> {
        let number_segment = number.to_string();
        let body = SetLabelsBody {
            labels: labels.iter().map(LabelName::as_str).collect(),
        };
        self.client
            .send_json_discarding(
                "set issue labels",
                Method::PUT,
                self.repo_url(&["issues", &number_segment, "labels"]),
                &body,
            )
            .await
    }

    #[instrument(skip_all, fields(card = %card, column = %column))]
    async fn move_card(
        &self,
        card: CardId,
        column: ColumnId,
        position: CardPosition,
    ) -> Result<(), GatewayError> {
        let id_segment = card.to_string();
        let body = MoveCardBody {
            position: position.as_str(),
            column_id: column.as_u64(),
        };
        self.client
            .send_json_discarding(
                "move card",
                Method::POST,
                self.client
                    .url(&["projects", "columns", "cards", &id_segment, "moves"]),
                &body,
            )
            .await?;
        if let Some(mut seen) = self.cache.card(card) {
            seen.column_id = column;
            self.cache.record_card(seen);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(column = %column, issue_id = %issue))]
    async fn create_card(
        &self,
        column: ColumnId,
        issue: IssueId,
    ) -> Result<ProjectCard, GatewayError> {
        let id_segment = column.to_string();
        let body = CreateCardBody {
            content_id: issue.as_u64(),
            content_type: "Issue",
        };
        let wire: CardWire = self
            .client
            .send_json(
                "create card",
                Method::POST,
                self.client
                    .url(&["projects", "columns", &id_segment, "cards"]),
                &body,
            )
            .await?;
        let card = wire.into_card_in(column);
        self.cache.record_card(card.clone());
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use reconciler::{ProjectId, Timestamp};

    #[derive(Default)]
    struct Recorded {
        project_lists: AtomicUsize,
        bodies: Mutex<Vec<(String, Value)>>,
    }

    type Shared = Arc<Recorded>;

    fn fake_github(recorded: Shared) -> Router {
        Router::new()
            .route(
                "/repos/octo/board/labels/{name}",
                get(|Path(name): Path<String>| async move {
                    if name == "In Consideration" {
                        Ok(Json(json!({"id": 7, "name": "In Consideration"})))
                    } else {
                        Err((StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))))
                    }
                }),
            )
            .route(
                "/repos/octo/board/projects",
                get(|State(recorded): State<Shared>| async move {
                    recorded.project_lists.fetch_add(1, Ordering::SeqCst);
                    Json(json!([
                        {"id": 1, "name": "Roadmap"},
                        {"id": 2, "name": "Suggestions overview"}
                    ]))
                }),
            )
            .route(
                "/projects/{id}/columns",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    let page: u64 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
                    let ids = if page == 1 { 1..=100 } else { 101..=101 };
                    let columns: Vec<Value> = ids
                        .map(|id| json!({"id": id, "name": format!("Column {id}")}))
                        .collect();
                    Json(columns)
                }),
            )
            .route(
                "/projects/columns/cards/{id}",
                get(|| async {
                    Json(json!({
                        "id": 5,
                        "column_url": "http://localhost/projects/columns/300",
                        "content_url": "http://localhost/repos/octo/board/issues/1"
                    }))
                }),
            )
            .route(
                "/projects/columns/{id}",
                get(|| async { Json(json!({"id": 300, "name": "Rejected"})) }),
            )
            .route(
                "/projects/columns/cards/{id}/moves",
                post(
                    |State(recorded): State<Shared>, Json(body): Json<Value>| async move {
                        recorded.bodies.lock().unwrap().push(("move".into(), body));
                        (StatusCode::CREATED, Json(json!({})))
                    },
                ),
            )
            .route(
                "/projects/columns/{id}/cards",
                post(
                    |State(recorded): State<Shared>, Json(body): Json<Value>| async move {
                        recorded.bodies.lock().unwrap().push(("create".into(), body));
                        (
                            StatusCode::CREATED,
                            Json(json!({"id": 77, "content_url": "http://localhost/repos/octo/board/issues/1"})),
                        )
                    },
                ),
            )
            .route(
                "/repos/octo/board/issues/{number}/labels",
                put(
                    |State(recorded): State<Shared>, Json(body): Json<Value>| async move {
                        recorded.bodies.lock().unwrap().push(("labels".into(), body));
                        Json(json!([]))
                    },
                ),
            )
            .route(
                "/repos/octo/board/issues/{number}",
                get(|| async {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"message": "Server Error"})),
                    )
                }),
            )
            .route(
                "/rate_limit",
                get(|| async {
                    Json(json!({"resources": {"core": {"limit": 5000, "remaining": 4321, "reset": 1700000000}}}))
                }),
            )
            .with_state(recorded)
    }

    async fn gateway() -> (GitHubGateway, Shared) {
        let recorded = Shared::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = fake_github(recorded.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = GitHubConfig::new("octo", "board", "test-token")
            .with_api_base(format!("http://{addr}"));
        let gateway = GitHubGateway::new(&config, Arc::new(LookupCache::new())).unwrap();
        (gateway, recorded)
    }

    #[tokio::test]
    async fn label_names_with_spaces_resolve_and_missing_labels_are_not_found() {
        let (gateway, _) = gateway().await;

        let label = gateway
            .get_label(&LabelName::new("In Consideration").unwrap())
            .await
            .unwrap();
        assert_eq!(label.name.as_str(), "In Consideration");

        let err = gateway
            .get_label(&LabelName::new("Nope").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn projects_are_listed_once_then_cached() {
        let (gateway, recorded) = gateway().await;
        let name = ProjectName::new("Suggestions overview").unwrap();

        let first = gateway.get_project(&name).await.unwrap();
        let second = gateway.get_project(&name).await.unwrap();

        assert_eq!(first.id, ProjectId::new(2));
        assert_eq!(first, second);
        assert_eq!(recorded.project_lists.load(Ordering::SeqCst), 1);

        let missing = gateway
            .get_project(&ProjectName::new("Nope").unwrap())
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn column_listing_follows_pagination() {
        let (gateway, _) = gateway().await;
        let project = Project {
            id: ProjectId::new(2),
            name: ProjectName::new("Suggestions overview").unwrap(),
        };

        let columns = gateway.get_project_columns(&project).await.unwrap();

        assert_eq!(columns.len(), 101);
        assert_eq!(gateway.cache().stats().columns, 101);
        let last = gateway
            .get_project_column(&project, &ColumnName::new("Column 101").unwrap())
            .await
            .unwrap();
        assert_eq!(last.id, ColumnId::new(101));
    }

    #[tokio::test]
    async fn card_column_is_read_from_the_card() {
        let (gateway, _) = gateway().await;
        let stale = ProjectCard {
            id: CardId::new(5),
            column_id: ColumnId::new(1),
            content_url: None,
            created_at: Some(Timestamp::now()),
        };

        let column = gateway.get_card_column(&stale).await.unwrap();

        assert_eq!(column.id, ColumnId::new(300));
        assert_eq!(column.name.as_str(), "Rejected");
    }

    #[tokio::test]
    async fn writes_send_the_documented_bodies() {
        let (gateway, recorded) = gateway().await;

        let card = gateway
            .create_card(ColumnId::new(300), IssueId::new(1347))
            .await
            .unwrap();
        assert_eq!(card.id, CardId::new(77));
        assert_eq!(card.column_id, ColumnId::new(300));

        gateway
            .move_card(card.id, ColumnId::new(300), CardPosition::Bottom)
            .await
            .unwrap();
        gateway
            .set_issue_labels(
                IssueNumber::new(1),
                &[LabelName::new("Rejected").unwrap(), LabelName::new("Suggestion").unwrap()],
            )
            .await
            .unwrap();

        let bodies = recorded.bodies.lock().unwrap().clone();
        assert_eq!(
            bodies,
            [
                (
                    "create".to_string(),
                    json!({"content_id": 1347, "content_type": "Issue"})
                ),
                (
                    "move".to_string(),
                    json!({"position": "bottom", "column_id": 300})
                ),
                (
                    "labels".to_string(),
                    json!({"labels": ["Rejected", "Suggestion"]})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn server_errors_become_transport_failures() {
        let (gateway, _) = gateway().await;

        let err = gateway.get_issue(IssueNumber::new(1)).await.unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Transport { status: Some(500), ref message, .. } if message == "Server Error"
        ));
    }

    #[tokio::test]
    async fn rate_limit_reports_remaining_quota() {
        let (gateway, _) = gateway().await;
        let limit = gateway.rate_limit().await.unwrap();
        assert_eq!((limit.limit, limit.remaining), (5000, 4321));
    }
}
