use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::Stage;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Examinee {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) hashed_password: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct SalesPaper {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) recommended_minutes: i32,
    pub(crate) is_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) sales_paper_id: String,
    pub(crate) title: String,
    pub(crate) question_type: i16,
    pub(crate) sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) description: String,
    pub(crate) sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Association {
    pub(crate) id: String,
    pub(crate) examinee_id: String,
    pub(crate) sales_paper_id: String,
    pub(crate) stage: Stage,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// One row of the caller's exam list: association joined with its paper.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AssociationSummary {
    pub(crate) association_id: String,
    pub(crate) sales_paper_id: String,
    pub(crate) paper_name: String,
    pub(crate) stage: Stage,
    pub(crate) recommended_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) association_id: String,
    pub(crate) examinee_id: String,
    pub(crate) sales_paper_id: String,
    pub(crate) begin_time: PrimitiveDateTime,
    pub(crate) last_action_time: Option<PrimitiveDateTime>,
    pub(crate) remaining_seconds: i32,
    pub(crate) completed_question_count: i32,
    pub(crate) deadline: PrimitiveDateTime,
    pub(crate) score: f64,
    pub(crate) comparability: i32,
    pub(crate) usability: i32,
    pub(crate) submit_time: Option<PrimitiveDateTime>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AnswerRecord {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) option_sign: String,
    pub(crate) score: f64,
    pub(crate) created_by: String,
    pub(crate) updated_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamEvent {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) session_id: String,
    pub(crate) user_id: String,
    pub(crate) event_type: String,
    pub(crate) client_ip: String,
    pub(crate) user_agent: String,
    pub(crate) metadata: Json<serde_json::Value>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct LoginRecord {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) login_platform: i16,
    pub(crate) created_at: PrimitiveDateTime,
}
