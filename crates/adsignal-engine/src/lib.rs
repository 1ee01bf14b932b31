//! Temporal strategic signal engine.
//!
//! Compares how categorical creative attributes are used in a recent window
//! against a baseline window (the radar and the weekly pulse surges), and
//! flags records whose embedding drifts from their brand's recent centroid.
//!
//! The engine owns no I/O. Storage and external services are reached through
//! the traits in [`store`].

pub mod aggregate;
pub mod anomaly;
pub mod error;
pub mod pulse;
pub mod radar;
pub mod store;
pub mod surge;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod vector;
pub mod window;

pub use aggregate::{aggregate, Aggregation, AttributeTally, FieldTally, Totals};
pub use anomaly::{
    Anomaly, AnomalyDetector, DetectionSummary, DetectorSettings, Evaluation, ANOMALY_EVENT,
};
pub use error::{BoxError, EngineError};
pub use pulse::{run_pulse, PulseResponse, PulseServices};
pub use radar::{build_radar, run_radar, RadarParams, RadarReport, Shift, Signal};
pub use store::{
    AnomalyFlag, EmbeddingService, NarrativeSynthesizer, NewPulseReport, PulseReport,
    RecordQuery, RecordStore, ReportStore, WebhookSink,
};
pub use surge::{detect_surges, Surge};
pub use window::{Window, WindowPair};
