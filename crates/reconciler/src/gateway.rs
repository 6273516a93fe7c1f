//! The repository gateway port.
//!
//! [`RepositoryGateway`] is the only way the engine and the registry reach
//! GitHub. The `github` crate implements it over the REST API; tests use the
//! in-memory double in [`crate::testing`].
//!
//! Implementations own all outbound network calls and translate every failure
//! into a [`GatewayError`]. They never retry.

use async_trait::async_trait;

use crate::{
    CardId, CardPosition, Column, ColumnId, ColumnName, GatewayError, Issue, IssueId, IssueNumber,
    Label, LabelName, Project, ProjectCard, ProjectName,
};

/// Issue, label, project, column, and card operations against one repository.
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    // -- reads --------------------------------------------------------------

    /// Fetches a fresh snapshot of an issue.
    async fn get_issue(&self, number: IssueNumber) -> Result<Issue, GatewayError>;

    async fn get_label(&self, name: &LabelName) -> Result<Label, GatewayError>;

    /// Finds an open project board by name.
    async fn get_project(&self, name: &ProjectName) -> Result<Project, GatewayError>;

    async fn get_project_columns(&self, project: &Project) -> Result<Vec<Column>, GatewayError>;

    /// Finds a column of `project` by name.
    ///
    /// The default implementation scans [`Self::get_project_columns`].
    async fn get_project_column(
        &self,
        project: &Project,
        name: &ColumnName,
    ) -> Result<Column, GatewayError> {
        self.get_project_columns(project)
            .await?
            .into_iter()
            .find(|column| &column.name == name)
            .ok_or_else(|| {
                GatewayError::not_found(format!(
                    "column '{name}' in project '{}'",
                    project.name
                ))
            })
    }

    /// Lists the cards of a column, top to bottom.
    ///
    /// Always a fresh read: placement decisions depend on it.
    async fn get_project_cards(&self, column: ColumnId) -> Result<Vec<ProjectCard>, GatewayError>;

    /// Resolves the column `card` currently sits in.
    async fn get_card_column(&self, card: &ProjectCard) -> Result<Column, GatewayError>;

    // -- writes -------------------------------------------------------------

    /// Replaces the issue's entire label set.
    async fn set_issue_labels(
        &self,
        number: IssueNumber,
        labels: &[LabelName],
    ) -> Result<(), GatewayError>;

    async fn move_card(
        &self,
        card: CardId,
        column: ColumnId,
        position: CardPosition,
    ) -> Result<(), GatewayError>;

    /// Creates a card in `column` linked to the issue with database ID `issue`.
    ///
    /// GitHub places new cards at the top of the column.
    async fn create_card(&self, column: ColumnId, issue: IssueId)
        -> Result<ProjectCard, GatewayError>;
}
