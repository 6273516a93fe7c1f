//! In-memory test double for [`RepositoryGateway`].
//!
//! [`InMemoryGateway`] models a single repository with labels, issues, and
//! project boards, and records every gateway call so tests can assert on the
//! exact reads and writes a reconciliation performs. Helper methods
//! (`add_*`, `cards_in`, `issue_labels`) manipulate or inspect the board
//! directly and are never recorded.
//!
//! Card placement follows GitHub: [`RepositoryGateway::create_card`] inserts at
//! the top of the column, and [`RepositoryGateway::move_card`] inserts at the
//! requested end.
//!
//! Enabled for this crate's own tests and, through the `test-support`
//! feature, for downstream crates.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{
    CardId, CardPosition, Column, ColumnId, ColumnName, GatewayError, Issue, IssueId, IssueNumber,
    Label, LabelName, LabelSet, Project, ProjectCard, ProjectId, ProjectName, RepositoryGateway,
    Timestamp,
};

/// Base of the issue URLs the double hands out.
pub const ISSUE_URL_BASE: &str = "https://api.github.com/repos/octo/board/issues";

/// Builds a [`LabelSet`] from string literals.
pub fn labels(names: &[&str]) -> LabelSet {
    names
        .iter()
        .map(|name| LabelName::new(*name).expect("label names in tests are non-empty"))
        .collect()
}

/// Returns the API URL of issue `number`.
pub fn issue_url(number: u64) -> String {
    format!("{ISSUE_URL_BASE}/{number}")
}

/// A gateway call, as recorded by [`InMemoryGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    GetIssue(IssueNumber),
    GetLabel(LabelName),
    GetProject(ProjectName),
    GetProjectColumns(ProjectId),
    GetProjectCards(ColumnId),
    GetCardColumn(CardId),
    SetIssueLabels(IssueNumber, Vec<LabelName>),
    MoveCard {
        card: CardId,
        column: ColumnId,
        position: CardPosition,
    },
    CreateCard {
        column: ColumnId,
        issue: IssueId,
    },
}

impl GatewayCall {
    /// Returns `true` for calls that change GitHub state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::SetIssueLabels(..) | Self::MoveCard { .. } | Self::CreateCard { .. }
        )
    }

    fn operation(&self) -> &'static str {
        match self {
            Self::GetIssue(_) => "get_issue",
            Self::GetLabel(_) => "get_label",
            Self::GetProject(_) => "get_project",
            Self::GetProjectColumns(_) => "get_project_columns",
            Self::GetProjectCards(_) => "get_project_cards",
            Self::GetCardColumn(_) => "get_card_column",
            Self::SetIssueLabels(..) => "set_issue_labels",
            Self::MoveCard { .. } => "move_card",
            Self::CreateCard { .. } => "create_card",
        }
    }
}

#[derive(Debug, Default)]
struct Board {
    next_id: u64,
    labels: LabelSet,
    issues: BTreeMap<IssueNumber, Issue>,
    projects: Vec<(Project, Vec<ColumnId>)>,
    /// Column metadata and its cards, top to bottom.
    columns: BTreeMap<ColumnId, (Column, Vec<ProjectCard>)>,
    calls: Vec<GatewayCall>,
    failing: HashSet<&'static str>,
    rival_creations: usize,
}

impl Board {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn locate_card(&self, card: CardId) -> Option<(ColumnId, usize)> {
        self.columns.iter().find_map(|(id, (_, cards))| {
            cards
                .iter()
                .position(|c| c.id == card)
                .map(|index| (*id, index))
        })
    }
}

/// An in-memory repository with project boards.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    board: Mutex<Board>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `call`, failing it with a transport error if its operation
    /// was registered through [`Self::fail_operation`].
    fn record(&self, call: GatewayCall) -> Result<MutexGuard<'_, Board>, GatewayError> {
        let mut board = self.board();
        let operation = call.operation();
        board.calls.push(call);
        if board.failing.contains(operation) {
            return Err(GatewayError::Transport {
                operation: operation.to_string(),
                status: Some(500),
                message: "injected failure".to_string(),
            });
        }
        Ok(board)
    }

    // -- setup --------------------------------------------------------------

    pub fn add_label(&self, name: &str) {
        self.board()
            .labels
            .insert(LabelName::new(name).expect("label names in tests are non-empty"));
    }

    pub fn add_project(&self, name: &str) -> Project {
        let mut board = self.board();
        let project = Project {
            id: ProjectId::new(board.next_id()),
            name: ProjectName::new(name).expect("project names in tests are non-empty"),
        };
        board.projects.push((project.clone(), Vec::new()));
        project
    }

    pub fn add_column(&self, project: &Project, name: &str) -> Column {
        let mut board = self.board();
        let column = Column {
            id: ColumnId::new(board.next_id()),
            name: ColumnName::new(name).expect("column names in tests are non-empty"),
        };
        board
            .projects
            .iter_mut()
            .find(|(p, _)| p.id == project.id)
            .expect("project was added to this gateway")
            .1
            .push(column.id);
        board
            .columns
            .insert(column.id, (column.clone(), Vec::new()));
        column
    }

    /// Adds issue `number` with the given labels. Labels need not exist.
    pub fn add_issue(&self, number: u64, issue_labels: &[&str]) -> Issue {
        let mut board = self.board();
        let issue = Issue {
            id: IssueId::new(10_000 + number),
            number: IssueNumber::new(number),
            url: issue_url(number),
            labels: labels(issue_labels),
        };
        board.issues.insert(issue.number, issue.clone());
        issue
    }

    /// Appends a card for issue `number` at the bottom of `column`.
    pub fn add_card(&self, column: ColumnId, number: u64) -> ProjectCard {
        let mut board = self.board();
        let card = ProjectCard {
            id: CardId::new(board.next_id()),
            column_id: column,
            content_url: Some(issue_url(number)),
            created_at: Some(Timestamp::now()),
        };
        board
            .columns
            .get_mut(&column)
            .expect("column was added to this gateway")
            .1
            .push(card.clone());
        card
    }

    /// Makes every subsequent call of `operation` (e.g. `"move_card"`) fail.
    pub fn fail_operation(&self, operation: &'static str) {
        self.board().failing.insert(operation);
    }

    /// Makes the next `create_card` find that another handler has just
    /// created a card for the same issue in the same column.
    pub fn race_next_creation(&self) {
        self.board().rival_creations += 1;
    }

    pub fn clear_failures(&self) {
        self.board().failing.clear();
    }

    // -- inspection ---------------------------------------------------------

    /// Returns the ID of the column named `name`.
    pub fn column_id(&self, name: &str) -> ColumnId {
        self.board()
            .columns
            .values()
            .find(|(column, _)| column.name.as_str() == name)
            .map(|(column, _)| column.id)
            .expect("column was added to this gateway")
    }

    /// Returns the cards of `column`, top to bottom.
    pub fn cards_in(&self, column: ColumnId) -> Vec<ProjectCard> {
        self.board()
            .columns
            .get(&column)
            .map(|(_, cards)| cards.clone())
            .unwrap_or_default()
    }

    pub fn issue_labels(&self, number: u64) -> LabelSet {
        self.board()
            .issues
            .get(&IssueNumber::new(number))
            .map(|issue| issue.labels.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.board().calls.clone()
    }

    pub fn writes(&self) -> Vec<GatewayCall> {
        self.board()
            .calls
            .iter()
            .filter(|call| call.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.board().calls.clear();
    }
}

#[async_trait]
impl RepositoryGateway for InMemoryGateway {
    async fn get_issue(&self, number: IssueNumber) -> Result<Issue, GatewayError> {
        let board = self.record(GatewayCall::GetIssue(number))?;
        board
            .issues
            .get(&number)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(format!("issue #{number}")))
    }

    async fn get_label(&self, name: &LabelName) -> Result<Label, GatewayError> {
        let board = self.record(GatewayCall::GetLabel(name.clone()))?;
        board
            .labels
            .get(name)
            .map(|name| Label { name: name.clone() })
            .ok_or_else(|| GatewayError::not_found(format!("label '{name}'")))
    }

    async fn get_project(&self, name: &ProjectName) -> Result<Project, GatewayError> {
        let board = self.record(GatewayCall::GetProject(name.clone()))?;
        board
            .projects
            .iter()
            .map(|(project, _)| project)
            .find(|project| &project.name == name)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(format!("project '{name}'")))
    }

    async fn get_project_columns(&self, project: &Project) -> Result<Vec<Column>, GatewayError> {
        let board = self.record(GatewayCall::GetProjectColumns(project.id))?;
        let (_, column_ids) = board
            .projects
            .iter()
            .find(|(p, _)| p.id == project.id)
            .ok_or_else(|| GatewayError::not_found(format!("project {}", project.id)))?;
        Ok(column_ids
            .iter()
            .filter_map(|id| board.columns.get(id).map(|(column, _)| column.clone()))
            .collect())
    }

    async fn get_project_cards(&self, column: ColumnId) -> Result<Vec<ProjectCard>, GatewayError> {
        let board = self.record(GatewayCall::GetProjectCards(column))?;
        board
            .columns
            .get(&column)
            .map(|(_, cards)| cards.clone())
            .ok_or_else(|| GatewayError::not_found(format!("column {column}")))
    }

    async fn get_card_column(&self, card: &ProjectCard) -> Result<Column, GatewayError> {
        let board = self.record(GatewayCall::GetCardColumn(card.id))?;
        let (column, _) = board
            .locate_card(card.id)
            .ok_or_else(|| GatewayError::not_found(format!("card {}", card.id)))?;
        Ok(board.columns[&column].0.clone())
    }

    async fn set_issue_labels(
        &self,
        number: IssueNumber,
        labels: &[LabelName],
    ) -> Result<(), GatewayError> {
        let mut board = self.record(GatewayCall::SetIssueLabels(number, labels.to_vec()))?;
        let issue = board
            .issues
            .get_mut(&number)
            .ok_or_else(|| GatewayError::not_found(format!("issue #{number}")))?;
        issue.labels = labels.iter().cloned().collect();
        Ok(())
    }

    async fn move_card(
        &self,
        card: CardId,
        column: ColumnId,
        position: CardPosition,
    ) -> Result<(), GatewayError> {
        let mut board = self.record(GatewayCall::MoveCard {
            card,
            column,
            position,
        })?;
        if !board.columns.contains_key(&column) {
            return Err(GatewayError::not_found(format!("column {column}")));
        }
        let (from, index) = board
            .locate_card(card)
            .ok_or_else(|| GatewayError::not_found(format!("card {card}")))?;
        let mut moved = board
            .columns
            .get_mut(&from)
            .map(|(_, cards)| cards.remove(index))
            .ok_or_else(|| GatewayError::not_found(format!("column {from}")))?;
        moved.column_id = column;
        if let Some((_, cards)) = board.columns.get_mut(&column) {
            match position {
                CardPosition::Top => cards.insert(0, moved),
                CardPosition::Bottom => cards.push(moved),
            }
        }
        Ok(())
    }

    async fn create_card(
        &self,
        column: ColumnId,
        issue: IssueId,
    ) -> Result<ProjectCard, GatewayError> {
        let mut board = self.record(GatewayCall::CreateCard { column, issue })?;
        let number = board
            .issues
            .values()
            .find(|i| i.id == issue)
            .map(|i| i.number)
            .ok_or_else(|| GatewayError::not_found(format!("issue with id {issue}")))?;
        if !board.columns.contains_key(&column) {
            return Err(GatewayError::not_found(format!("column {column}")));
        }
        if board.rival_creations > 0 {
            board.rival_creations -= 1;
            let rival = ProjectCard {
                id: CardId::new(board.next_id()),
                column_id: column,
                content_url: Some(issue_url(number.as_u64())),
                created_at: Some(Timestamp::now()),
            };
            if let Some((_, cards)) = board.columns.get_mut(&column) {
                cards.insert(0, rival);
            }
        }
        let card = ProjectCard {
            id: CardId::new(board.next_id()),
            column_id: column,
            content_url: Some(issue_url(number.as_u64())),
            created_at: Some(Timestamp::now()),
        };
        board
            .columns
            .get_mut(&column)
            .ok_or_else(|| GatewayError::not_found(format!("column {column}")))?
            .1
            .insert(0, card.clone());
        Ok(card)
    }
}
