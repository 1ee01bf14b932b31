//! Static descriptor table for the classification fields the engine aggregates.
//!
//! Each field is typed up front as scalar or set; nothing is inferred from the
//! stored JSON at runtime.

use crate::record::Classification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Set,
}

#[derive(Clone, Copy)]
enum Accessor {
    Scalar(fn(&Classification) -> Option<&str>),
    Set(fn(&Classification) -> &[String]),
}

/// A named classification field and how to read it.
#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    accessor: Accessor,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("kind", &self.kind())
            .finish()
    }
}

impl FieldDescriptor {
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self.accessor {
            Accessor::Scalar(_) => FieldKind::Scalar,
            Accessor::Set(_) => FieldKind::Set,
        }
    }

    /// Distinct non-blank values of this field in first-seen order.
    ///
    /// A value repeated inside one record's array is returned once, so counts
    /// built from this mean "records using the value at least once".
    #[must_use]
    pub fn values<'a>(&self, classification: &'a Classification) -> Vec<&'a str> {
        let raw: Vec<&str> = match self.accessor {
            Accessor::Scalar(read) => read(classification).into_iter().collect(),
            Accessor::Set(read) => read(classification).iter().map(String::as_str).collect(),
        };

        let mut out: Vec<&str> = Vec::with_capacity(raw.len());
        for value in raw {
            if value.trim().is_empty() || out.contains(&value) {
                continue;
            }
            out.push(value);
        }
        out
    }
}

fn trigger_mechanic(c: &Classification) -> Option<&str> {
    c.trigger_mechanic.as_deref()
}

fn narrative_framework(c: &Classification) -> Option<&str> {
    c.narrative_framework.as_deref()
}

fn offer_type(c: &Classification) -> Option<&str> {
    c.offer_type.as_deref()
}

fn claim_type(c: &Classification) -> Option<&str> {
    c.claim_type.as_deref()
}

fn visual_style(c: &Classification) -> &[String] {
    &c.visual_style
}

fn emotion_tone(c: &Classification) -> &[String] {
    &c.emotion_tone
}

pub const TRIGGER_MECHANIC: FieldDescriptor = FieldDescriptor {
    key: "trigger_mechanic",
    label: "Trigger Mechanic",
    accessor: Accessor::Scalar(trigger_mechanic),
};

pub const NARRATIVE_FRAMEWORK: FieldDescriptor = FieldDescriptor {
    key: "narrative_framework",
    label: "Narrative Framework",
    accessor: Accessor::Scalar(narrative_framework),
};

pub const OFFER_TYPE: FieldDescriptor = FieldDescriptor {
    key: "offer_type",
    label: "Offer Type",
    accessor: Accessor::Scalar(offer_type),
};

pub const CLAIM_TYPE: FieldDescriptor = FieldDescriptor {
    key: "claim_type",
    label: "Claim Type",
    accessor: Accessor::Scalar(claim_type),
};

pub const VISUAL_STYLE: FieldDescriptor = FieldDescriptor {
    key: "visual_style",
    label: "Visual Style",
    accessor: Accessor::Set(visual_style),
};

pub const EMOTION_TONE: FieldDescriptor = FieldDescriptor {
    key: "emotion_tone",
    label: "Emotion / Tone",
    accessor: Accessor::Set(emotion_tone),
};

/// Fields shown on the trend radar, in display order.
pub static RADAR_FIELDS: [FieldDescriptor; 6] = [
    TRIGGER_MECHANIC,
    NARRATIVE_FRAMEWORK,
    OFFER_TYPE,
    CLAIM_TYPE,
    VISUAL_STYLE,
    EMOTION_TONE,
];

/// Fields checked for category-wide surges by the pulse pass.
pub static PULSE_FIELDS: [FieldDescriptor; 2] = [TRIGGER_MECHANIC, NARRATIVE_FRAMEWORK];
