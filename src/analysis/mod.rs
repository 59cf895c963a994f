pub mod chat;
pub mod classifier;
pub mod intent;
pub mod openrouter;
pub mod pipeline;
pub mod scoring;
pub mod types;

pub use chat::{ChatMessage, ChatModel, ChatRequest, Role};
pub use classifier::{Classifier, DraftContext, IndexedComment};
pub use intent::IntentCategory;
pub use openrouter::{CreditBalance, OpenRouterClient};
pub use pipeline::{AnalysisStage, Pipeline, ProgressObserver};
pub use types::{AnalysisResult, CategoryCounts, Classification, ScoreLevel};
