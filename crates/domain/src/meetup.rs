use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::notifications::{
    MeetupTerms, Notification, NotificationBody, NotificationCreate, NotificationService,
};
use crate::ports::notifications::ProposalResolution;
use crate::util::{format_ms_rfc3339, now_ms};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Proposed,
    Accepted,
    Contested,
    Denied,
}

impl NegotiationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Contested => "contested",
            Self::Denied => "denied",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MeetupAction {
    Accept,
    Contest,
    Deny,
}

impl MeetupAction {
    pub const ALL: [MeetupAction; 3] = [Self::Accept, Self::Contest, Self::Deny];

    pub fn outcome(&self) -> NegotiationState {
        match self {
            Self::Accept => NegotiationState::Accepted,
            Self::Contest => NegotiationState::Contested,
            Self::Deny => NegotiationState::Denied,
        }
    }
}

/// The recipient's answer to a proposal. A counter-proposal carries its own
/// already-validated terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeetupReply {
    Accept,
    Contest(MeetupTerms),
    Deny,
}

impl MeetupReply {
    pub fn action(&self) -> MeetupAction {
        match self {
            Self::Accept => MeetupAction::Accept,
            Self::Contest(_) => MeetupAction::Contest,
            Self::Deny => MeetupAction::Deny,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResolutionReceipt {
    pub proposal_id: String,
    pub outcome: NegotiationState,
    pub notifications: Vec<Notification>,
}

/// Builds the follow-up notifications for answering `proposal` without
/// touching any store. The original sender, when known, is told the outcome
/// and the actor always gets an already-read entry recording what they did.
pub fn plan_resolution(
    actor: &ActorIdentity,
    proposal: &Notification,
    reply: &MeetupReply,
    now_ms: i64,
) -> DomainResult<ProposalResolution> {
    let terms = proposal.body.terms().ok_or_else(|| {
        DomainError::Conflict("notification is not a meet-up proposal".into())
    })?;
    if proposal.recipient_id != actor.user_id {
        return Err(DomainError::Forbidden(
            "only the recipient can answer a meet-up proposal".into(),
        ));
    }

    let name = actor.display_name();
    let counterpart = proposal.sender_id.as_deref();
    if counterpart.is_none() && matches!(reply, MeetupReply::Contest(_)) {
        return Err(DomainError::Conflict(
            "proposal has no sender to answer".into(),
        ));
    }

    let (to_sender, self_log) = match reply {
        MeetupReply::Accept => (
            NotificationBody::plain(format!(
                "{name} accepted your meet-up at {} on {}.",
                terms.location,
                format_ms_rfc3339(terms.meet_time_ms)
            )),
            NotificationBody::plain(format!(
                "You accepted the meet-up at {} on {}.",
                terms.location,
                format_ms_rfc3339(terms.meet_time_ms)
            )),
        ),
        MeetupReply::Contest(counter) => (
            NotificationBody::proposal(
                format!(
                    "{name} suggested meeting at {} on {} instead.",
                    counter.location,
                    format_ms_rfc3339(counter.meet_time_ms)
                ),
                counter.clone(),
            ),
            NotificationBody::plain(format!(
                "You suggested meeting at {} on {} instead of {} on {}.",
                counter.location,
                format_ms_rfc3339(counter.meet_time_ms),
                terms.location,
                format_ms_rfc3339(terms.meet_time_ms)
            )),
        ),
        MeetupReply::Deny => (
            NotificationBody::plain(format!(
                "{name} declined your meet-up at {} on {}.",
                terms.location,
                format_ms_rfc3339(terms.meet_time_ms)
            )),
            NotificationBody::plain(format!(
                "You declined the meet-up at {} on {}.",
                terms.location,
                format_ms_rfc3339(terms.meet_time_ms)
            )),
        ),
    };

    let mut emitted = Vec::with_capacity(2);
    if let Some(counterpart) = counterpart {
        emitted.push(Notification::new(
            counterpart,
            Some(actor.user_id.clone()),
            proposal.item_id.clone(),
            to_sender,
            now_ms,
        ));
    }
    let mut entry = Notification::new(
        actor.user_id.clone(),
        Some(actor.user_id.clone()),
        proposal.item_id.clone(),
        self_log,
        now_ms,
    );
    entry.read_at_ms = Some(now_ms);
    emitted.push(entry);

    Ok(ProposalResolution {
        proposal_id: proposal.notification_id.clone(),
        recipient_id: proposal.recipient_id.clone(),
        emitted,
    })
}

#[derive(Clone)]
pub struct MeetupNegotiator {
    notifications: NotificationService,
}

impl MeetupNegotiator {
    pub fn new(notifications: NotificationService) -> Self {
        Self { notifications }
    }

    /// Stores a new proposal. Terms are mandatory here regardless of the
    /// caller's flag.
    pub async fn propose(&self, input: NotificationCreate) -> DomainResult<Notification> {
        self.notifications
            .create(NotificationCreate {
                is_meetup: true,
                ..input
            })
            .await
    }

    pub async fn accept(
        &self,
        actor: &ActorIdentity,
        notification_id: &str,
    ) -> DomainResult<ResolutionReceipt> {
        self.resolve(actor, notification_id, MeetupReply::Accept)
            .await
    }

    /// Counter-proposes new terms. The terms are checked before the proposal
    /// is even loaded.
    pub async fn contest(
        &self,
        actor: &ActorIdentity,
        notification_id: &str,
        location: Option<&str>,
        meet_time_ms: Option<i64>,
    ) -> DomainResult<ResolutionReceipt> {
        let counter = MeetupTerms::validate(location, meet_time_ms, now_ms())?;
        self.resolve(actor, notification_id, MeetupReply::Contest(counter))
            .await
    }

    pub async fn deny(
        &self,
        actor: &ActorIdentity,
        notification_id: &str,
    ) -> DomainResult<ResolutionReceipt> {
        self.resolve(actor, notification_id, MeetupReply::Deny).await
    }

    async fn resolve(
        &self,
        actor: &ActorIdentity,
        notification_id: &str,
        reply: MeetupReply,
    ) -> DomainResult<ResolutionReceipt> {
        let proposal = self.notifications.get_own(actor, notification_id).await?;
        let resolution = plan_resolution(actor, &proposal, &reply, now_ms())?;
        let notifications = self
            .notifications
            .repository()
            .resolve_proposal(&resolution)
            .await?;
        let outcome = reply.action().outcome();
        tracing::info!(
            proposal_id = %resolution.proposal_id,
            actor_id = %actor.user_id,
            outcome = outcome.as_str(),
            emitted = notifications.len(),
            "meet-up proposal resolved"
        );
        Ok(ResolutionReceipt {
            proposal_id: resolution.proposal_id,
            outcome,
            notifications,
        })
    }
}
