use super::parsing::{
    env_optional, env_or_default, is_supported_algorithm, parse_bool, parse_cors_origins,
    parse_environment, parse_fingerprint_policy, parse_u16, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret;
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, EventSettings, ExamSettings,
    IdSettings, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, TelemetrySettings,
};

const MAX_WORKER_ID: u16 = 1023;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAM_HOST", "0.0.0.0");
        let port = env_or_default("EXAM_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAM_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAM_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Session API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let access_secret_env = env_optional("ACCESS_TOKEN_SECRET");
        let exam_secret_env = env_optional("EXAM_TOKEN_SECRET");
        if strict_config {
            if access_secret_env.is_none() {
                return Err(ConfigError::MissingSecret("ACCESS_TOKEN_SECRET"));
            }
            if exam_secret_env.is_none() {
                return Err(ConfigError::MissingSecret("EXAM_TOKEN_SECRET"));
            }
        }
        let access_secret =
            access_secret_env.unwrap_or_else(|| load_or_create_secret(".access_token_secret"));
        let exam_secret =
            exam_secret_env.unwrap_or_else(|| load_or_create_secret(".exam_token_secret"));

        let algorithm = env_or_default("TOKEN_ALGORITHM", "HS256").to_ascii_uppercase();
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "1440"),
        )?;
        let exam_token_default_minutes = parse_u64(
            "EXAM_TOKEN_DEFAULT_MINUTES",
            env_or_default("EXAM_TOKEN_DEFAULT_MINUTES", "120"),
        )?;
        let fingerprint_policy = parse_fingerprint_policy(env_optional("EXAM_FINGERPRINT_POLICY"))?;

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exam");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exam_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let heartbeat_min_interval_seconds = parse_u64(
            "HEARTBEAT_MIN_INTERVAL_SECONDS",
            env_or_default("HEARTBEAT_MIN_INTERVAL_SECONDS", "5"),
        )?;
        let inactivity_threshold_seconds = parse_u64(
            "INACTIVITY_THRESHOLD_SECONDS",
            env_or_default("INACTIVITY_THRESHOLD_SECONDS", "300"),
        )?;
        let max_charge_seconds =
            parse_u64("MAX_CHARGE_SECONDS", env_or_default("MAX_CHARGE_SECONDS", "30"))?;
        let attempt_deadline_days =
            parse_u64("ATTEMPT_DEADLINE_DAYS", env_or_default("ATTEMPT_DEADLINE_DAYS", "3"))?;
        let submit_lock_ttl_seconds = parse_u64(
            "SUBMIT_LOCK_TTL_SECONDS",
            env_or_default("SUBMIT_LOCK_TTL_SECONDS", "5"),
        )?;
        let submitted_marker_ttl_seconds = parse_u64(
            "SUBMITTED_MARKER_TTL_SECONDS",
            env_or_default("SUBMITTED_MARKER_TTL_SECONDS", "14400"),
        )?;
        let question_cache_ttl_seconds = parse_u64(
            "QUESTION_CACHE_TTL_SECONDS",
            env_or_default("QUESTION_CACHE_TTL_SECONDS", "180"),
        )?;

        let queue_capacity =
            parse_usize("EVENT_QUEUE_CAPACITY", env_or_default("EVENT_QUEUE_CAPACITY", "1024"))?;

        let worker_id =
            parse_u16("SNOWFLAKE_WORKER_ID", env_or_default("SNOWFLAKE_WORKER_ID", "1"))?;

        let log_level = env_or_default("EXAM_LOG_LEVEL", "info");
        let json = env_optional("EXAM_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings {
                access_secret,
                exam_secret,
                algorithm,
                access_token_expire_minutes,
                exam_token_default_minutes,
                fingerprint_policy,
            },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            exam: ExamSettings {
                heartbeat_min_interval_seconds,
                inactivity_threshold_seconds,
                max_charge_seconds,
                attempt_deadline_days,
                submit_lock_ttl_seconds,
                submitted_marker_ttl_seconds,
                question_cache_ttl_seconds,
            },
            events: EventSettings { queue_capacity },
            ids: IdSettings { worker_id },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn events(&self) -> &EventSettings {
        &self.events
    }

    pub(crate) fn ids(&self) -> &IdSettings {
        &self.ids
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !is_supported_algorithm(&self.security.algorithm) {
            return Err(ConfigError::InvalidValue {
                field: "TOKEN_ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if self.security.access_token_expire_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ACCESS_TOKEN_EXPIRE_MINUTES",
                value: "0".to_string(),
            });
        }

        if self.security.exam_token_default_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_TOKEN_DEFAULT_MINUTES",
                value: "0".to_string(),
            });
        }

        if self.ids.worker_id > MAX_WORKER_ID {
            return Err(ConfigError::InvalidValue {
                field: "SNOWFLAKE_WORKER_ID",
                value: self.ids.worker_id.to_string(),
            });
        }

        if self.exam.submit_lock_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SUBMIT_LOCK_TTL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.events.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EVENT_QUEUE_CAPACITY",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.security.access_secret == self.security.exam_secret {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_TOKEN_SECRET",
                value: "<same as ACCESS_TOKEN_SECRET>".to_string(),
            });
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl RedisSettings {
    pub(crate) fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!("redis://:{}@{}:{}/{}", self.password, self.host, self.port, self.db)
        }
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}
