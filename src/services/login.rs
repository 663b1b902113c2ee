use std::sync::Arc;

use crate::core::ids::{prefix, IdGenerator};
use crate::core::security::{self, TokenService};
use crate::core::time::Clock;
use crate::db::models::LoginRecord;
use crate::db::types::LoginPlatform;
use crate::services::exam_session::ExamError;
use crate::services::stores::{ExamineeStore, LoginRecordStore};

pub(crate) const EXAMINEE_ROLE: &str = "examinee";

const INCORRECT_CREDENTIALS: &str = "Incorrect account or password";

#[derive(Debug, Clone)]
pub(crate) struct LoginOutcome {
    pub(crate) access_token: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
}

pub(crate) struct LoginService {
    examinees: Arc<dyn ExamineeStore>,
    records: Arc<dyn LoginRecordStore>,
    tokens: Arc<TokenService>,
    ids: Arc<IdGenerator>,
    clock: Arc<dyn Clock>,
    // Verified against when the account is unknown so both paths cost one
    // argon2 run.
    dummy_hash: Option<String>,
}

impl LoginService {
    pub(crate) fn new(
        examinees: Arc<dyn ExamineeStore>,
        records: Arc<dyn LoginRecordStore>,
        tokens: Arc<TokenService>,
        ids: Arc<IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dummy_hash = match security::hash_password("unknown-account-placeholder") {
            Ok(hash) => Some(hash),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to prepare placeholder password hash");
                None
            }
        };
        Self { examinees, records, tokens, ids, clock, dummy_hash }
    }

    pub(crate) async fn login(&self, account: &str, password: &str) -> Result<LoginOutcome, ExamError> {
        let examinee = self
            .examinees
            .find_by_email(account)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load examinee"))?;

        let Some(examinee) = examinee else {
            if let Some(hash) = &self.dummy_hash {
                let _ = security::verify_password(password, hash);
            }
            return Err(ExamError::Unauthorized(INCORRECT_CREDENTIALS));
        };

        let verified = security::verify_password(password, &examinee.hashed_password)
            .map_err(|_| ExamError::Unauthorized(INCORRECT_CREDENTIALS))?;
        if !verified {
            return Err(ExamError::Unauthorized(INCORRECT_CREDENTIALS));
        }

        if !examinee.is_active {
            return Err(ExamError::InvalidState("account is not active"));
        }

        self.append_login_record(&examinee.id).await;

        let access_token = self
            .tokens
            .issue_access_token(&examinee.id, &examinee.username, EXAMINEE_ROLE)
            .map_err(|err| ExamError::internal(err, "Failed to create access token"))?;

        tracing::info!(user_id = %examinee.id, "Examinee logged in");

        Ok(LoginOutcome { access_token, user_id: examinee.id, username: examinee.username })
    }

    // Login history is best-effort; it never blocks a successful login.
    async fn append_login_record(&self, user_id: &str) {
        let id = match self.ids.next_id(prefix::LOGIN_RECORD) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(error = %err, user_id = %user_id, "Failed to allocate login record id");
                return;
            }
        };

        let record = LoginRecord {
            id,
            user_id: user_id.to_string(),
            login_platform: LoginPlatform::Exam as i16,
            created_at: self.clock.now(),
        };

        if let Err(err) = self.records.create(&record).await {
            tracing::warn!(error = %err, user_id = %user_id, "Failed to store login record");
        }
    }
}
