use bglab_core::protocol::Participant;
use bglab_core::ParticipantId;

pub const ROSTER_COLORS: [&str; 5] = ["#ff6b6b", "#4ecdc4", "#45b7d1", "#f9d423", "#a8dadc"];
pub const PLACEHOLDER_NAME: &str = "connecting…";
pub const PLACEHOLDER_COLOR: &str = "#999999";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge<'a> {
    pub name: &'a str,
    pub color: &'static str,
}

/// Room participants in relay order. Colors follow roster position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    pub fn new(participants: Vec<Participant>) -> Self {
        Self { participants }
    }

    pub fn replace(&mut self, participants: Vec<Participant>) {
        self.participants = participants;
    }

    pub fn remove(&mut self, participant_id: ParticipantId) -> bool {
        let before = self.participants.len();
        self.participants
            .retain(|participant| participant.participant_id != participant_id);
        self.participants.len() != before
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn badge(&self, participant_id: ParticipantId) -> Badge<'_> {
        self.participants
            .iter()
            .position(|participant| participant.participant_id == participant_id)
            .map(|index| Badge {
                name: &self.participants[index].display_name,
                color: ROSTER_COLORS[index % ROSTER_COLORS.len()],
            })
            .unwrap_or(Badge {
                name: PLACEHOLDER_NAME,
                color: PLACEHOLDER_COLOR,
            })
    }
}
