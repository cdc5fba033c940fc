use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u16,
    parse_u32, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, ApiSettings, ConfigError, ContestSettings, CorsSettings, DatabaseSettings,
    RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("CONTEST_HOST", "0.0.0.0");
        let port = env_or_default("CONTEST_PORT", "8000");

        let environment =
            parse_environment(env_optional("CONTEST_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("CONTEST_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Contest API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "180"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "contestsuperuser");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "contest_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let test_duration_minutes = parse_u64(
            "CONTEST_TEST_DURATION_MINUTES",
            env_or_default("CONTEST_TEST_DURATION_MINUTES", "60"),
        )?;
        let choice_count =
            parse_usize("CONTEST_CHOICE_COUNT", env_or_default("CONTEST_CHOICE_COUNT", "20"))?;
        let true_false_count = parse_usize(
            "CONTEST_TRUE_FALSE_COUNT",
            env_or_default("CONTEST_TRUE_FALSE_COUNT", "10"),
        )?;
        let question_seed_scale = parse_u32(
            "CONTEST_QUESTION_SEED_SCALE",
            env_or_default("CONTEST_QUESTION_SEED_SCALE", "100"),
        )?;
        let summary_expire_minutes = parse_u64(
            "CONTEST_SUMMARY_EXPIRE_MINUTES",
            env_or_default("CONTEST_SUMMARY_EXPIRE_MINUTES", "10"),
        )?;
        let sync_interval_minutes = parse_u64(
            "CONTEST_SYNC_INTERVAL_MINUTES",
            env_or_default("CONTEST_SYNC_INTERVAL_MINUTES", "10"),
        )?;
        let reports_dir = env_or_default("CONTEST_REPORTS_DIR", "reports");
        let refresh_cache =
            env_optional("CONTEST_REFRESH_CACHE").map(|value| parse_bool(&value)).unwrap_or(false);
        let regenerate_seeds = env_optional("CONTEST_REGENERATE_SEEDS")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let first_admin_username = env_or_default("FIRST_ADMIN_USERNAME", "admin");
        let first_admin_password = env_or_default("FIRST_ADMIN_PASSWORD", "");

        let log_level = env_or_default("CONTEST_LOG_LEVEL", "info");
        let json = env_optional("CONTEST_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
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
            contest: ContestSettings {
                test_duration_minutes,
                choice_count,
                true_false_count,
                question_seed_scale,
                summary_expire_minutes,
                sync_interval_minutes,
                reports_dir,
                refresh_cache,
                regenerate_seeds,
            },
            admin: AdminSettings { first_admin_username, first_admin_password },
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

    pub(crate) fn contest(&self) -> &ContestSettings {
        &self.contest
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.contest.choice_count == 0 && self.contest.true_false_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CONTEST_CHOICE_COUNT/CONTEST_TRUE_FALSE_COUNT",
                value: "0".to_string(),
            });
        }

        if self.contest.question_seed_scale == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CONTEST_QUESTION_SEED_SCALE",
                value: "0".to_string(),
            });
        }

        if self.contest.test_duration_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CONTEST_TEST_DURATION_MINUTES",
                value: "0".to_string(),
            });
        }

        if self.contest.sync_interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CONTEST_SYNC_INTERVAL_MINUTES",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.admin.first_admin_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_ADMIN_PASSWORD"));
        }

        Ok(())
    }
}
