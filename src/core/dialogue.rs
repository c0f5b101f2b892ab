use crate::core::context::{Context, ContextId};
use crate::core::goal::{Goal, GoalStatus};
use crate::schema::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueStatus {
    Created,
    Running,
    Succeeded,
    /// The step ceiling was reached, or nobody had anything left to say.
    InProgress,
    Failed,
}

impl DialogueStatus {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            DialogueStatus::Succeeded | DialogueStatus::InProgress | DialogueStatus::Failed
        )
    }
}

/// One run of a template: participants, the goal and what was said.
#[derive(Debug, Clone)]
pub struct Dialogue {
    pub id: u64,
    pub template: String,
    /// Turn order: the user first, then the agent.
    pub participants: Vec<EntityId>,
    pub goal_owner: EntityId,
    pub start: ContextId,
    pub goal: Option<Goal>,
    pub status: DialogueStatus,
    /// Participant utterances so far; observations do not count.
    pub steps: usize,
    pub max_steps: usize,
    /// Context ids of everything this dialogue appended.
    pub produced: Vec<ContextId>,
    pub lines: Vec<String>,
}

impl Dialogue {
    pub fn new(
        id: u64,
        template: &str,
        participants: Vec<EntityId>,
        goal_owner: EntityId,
        start: ContextId,
        max_steps: usize,
    ) -> Self {
        Self {
            id,
            template: template.to_string(),
            participants,
            goal_owner,
            start,
            goal: None,
            status: DialogueStatus::Created,
            steps: 0,
            max_steps,
            produced: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn user(&self) -> Option<EntityId> {
        self.participants.first().copied()
    }

    pub fn record(&mut self, id: ContextId, line: String) {
        self.produced.push(id);
        self.lines.push(line);
    }

    pub fn budget_left(&self) -> bool {
        self.steps < self.max_steps
    }

    /// Attach the goal owner's first goal; later ones are ignored.
    pub fn adopt_goal(&mut self, goal: Option<Goal>) {
        if self.goal.is_none() {
            self.goal = goal;
        }
    }

    /// Re-evaluate the goal and settle the status when it is decided.
    pub fn check_goal(&mut self, context: &Context) -> GoalStatus {
        let status = self
            .goal
            .as_ref()
            .map_or(GoalStatus::Pending, |g| g.evaluate(context));
        match status {
            GoalStatus::Satisfied => self.status = DialogueStatus::Succeeded,
            GoalStatus::Contradicted => self.status = DialogueStatus::Failed,
            GoalStatus::Pending => {}
        }
        status
    }

    /// Close a dialogue that ended without a decided goal.
    pub fn finish(&mut self) -> DialogueStatus {
        if !self.status.is_final() {
            self.status = DialogueStatus::InProgress;
        }
        self.status
    }
}
