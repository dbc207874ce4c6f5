//! Static checks over the scheduled-task configuration.
//!
//! Nothing here runs a scheduler. The checks are textual: they look for the
//! patterns a well-formed `config/server.toml` and `config/cron-tasks.toml`
//! are expected to contain and score the result.

use regex::Regex;
use serde::Serialize;
use std::{path::Path, sync::LazyLock};

static JOB_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*\[jobs\.([A-Za-z0-9_-]+)\]"#).expect("valid regex"));
static KEY_FORMAT_JOB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(\[jobs\.)?"[0-9*\s/,\-]+"\]?\s*(=|$)"#).expect("valid regex")
});
static RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*rule\s*=\s*"([^"]+)""#).expect("valid regex"));
static TZ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*tz\s*=\s*""#).expect("valid regex"));
static CRON_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[0-9*\s/,\-]+$"#).expect("valid regex"));
static TASKS_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*tasks\s*=\s*"cron-tasks\.toml""#).expect("valid regex")
});
static CRON_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*\[cron\]"#).expect("valid regex"));
static ENABLED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*enabled\s*=\s*true"#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
}

impl Check {
    fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleCheck {
    pub rule: String,
    /// Five or six whitespace-separated fields
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Excellent,
    Good,
    NeedsUpdates,
}

#[derive(Debug, Clone, Serialize)]
pub struct CronReport {
    pub server: Vec<Check>,
    pub format: Vec<Check>,
    pub jobs: Vec<String>,
    pub rules: Vec<RuleCheck>,
    /// Scored checks
    pub compliance: Vec<Check>,
    /// Scored checks
    pub best_practices: Vec<Check>,
}

impl CronReport {
    fn scored(&self) -> impl Iterator<Item = &Check> {
        self.compliance.iter().chain(self.best_practices.iter())
    }

    pub fn passed(&self) -> usize {
        self.scored().filter(|c| c.passed).count()
    }

    pub fn total(&self) -> usize {
        self.compliance.len() + self.best_practices.len()
    }

    /// Percentage of scored checks passed, rounded
    pub fn score(&self) -> u32 {
        if self.total() == 0 {
            return 0;
        }
        ((self.passed() as f64 / self.total() as f64) * 100.0).round() as u32
    }

    pub fn verdict(&self) -> Verdict {
        match self.score() {
            s if s >= 90 => Verdict::Excellent,
            s if s >= 75 => Verdict::Good,
            _ => Verdict::NeedsUpdates,
        }
    }
}

fn rule_is_valid(rule: &str) -> bool {
    let fields = rule.split_whitespace().count();
    (5..=6).contains(&fields)
}

/// Run every check over the two configuration texts.
pub fn check(server: &str, tasks: &str, timezone: &str) -> CronReport {
    let server_checks = vec![
        Check::new("References cron-tasks.toml", TASKS_REF.is_match(server)),
        Check::new(
            "Cron enabled",
            CRON_SECTION.is_match(server) && ENABLED.is_match(server),
        ),
    ];

    let jobs: Vec<String> = JOB_HEADER
        .captures_iter(tasks)
        .map(|c| c[1].to_string())
        .collect();
    let key_format = KEY_FORMAT_JOB.is_match(tasks);
    let has_rule = RULE.is_match(tasks);
    let expected_tz = format!(r#"tz = "{}""#, timezone);

    let format = vec![
        Check::new(
            "Uses job table format",
            tasks.contains("[jobs.") && tasks.contains("task ="),
        ),
        Check::new(format!("Has timezone {}", timezone), tasks.contains(&expected_tz)),
        Check::new("Has rule property", has_rule),
        Check::new("No schedule-as-key format", !key_format),
    ];

    let rules: Vec<RuleCheck> = RULE
        .captures_iter(tasks)
        .map(|c| RuleCheck {
            rule: c[1].to_string(),
            valid: rule_is_valid(&c[1]),
        })
        .collect();

    let compliance = vec![
        Check::new("Jobs declared under [jobs.<name>]", tasks.contains("[jobs.")),
        Check::new("Jobs name a task handler", tasks.contains("task =")),
        Check::new("Jobs declare a rule", has_rule),
        Check::new("Timezone configuration", TZ.is_match(tasks)),
        Check::new("Named jobs (not key format)", !key_format && !jobs.is_empty()),
        Check::new("Failure handling in jobs", tasks.contains("on_failure =")),
        Check::new("Logging configured", tasks.contains("log_level =")),
    ];

    let best_practices = vec![
        Check::new(
            "Descriptive job names",
            jobs.iter().all(|name| name.len() > 3 && !CRON_LIKE.is_match(name)),
        ),
        Check::new(
            "Consistent timezone usage",
            TZ.find_iter(tasks).count() == jobs.len(),
        ),
        Check::new(
            "Proper error logging",
            tasks.contains(r#"on_failure = "log""#),
        ),
        Check::new("Success logging", tasks.contains(r#"log_level = "info""#)),
        Check::new(
            "Valid cron rules",
            !rules.is_empty() && rules.iter().all(|r| r.valid),
        ),
    ];

    CronReport {
        server: server_checks,
        format,
        jobs,
        rules,
        compliance,
        best_practices,
    }
}

/// Read `server.toml` and `cron-tasks.toml` from `dir` and check them.
pub fn check_dir(dir: &Path, timezone: &str) -> anyhow::Result<CronReport> {
    let read = |name: &str| {
        let path = dir.join(name);
        std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))
    };

    let server = read("server.toml")?;
    let tasks = read("cron-tasks.toml")?;

    Ok(check(&server, &tasks, timezone))
}
