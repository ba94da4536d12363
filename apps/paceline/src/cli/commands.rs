//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::Settings;
use crate::api;
use chrono::{DateTime, Utc};
use paceline_core::{
    CloseStatus, Engine, InstanceId, MemoryStore, OwnerRole, PacelineError, SlaPolicy, StageName,
};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open an engine on the configured backend.
pub fn load_engine(settings: &Settings) -> Result<Engine, PacelineError> {
    match settings.backend.as_str() {
        "redb" => Engine::with_redb(&settings.database),
        "memory" => Ok(Engine::with_memory(MemoryStore::new())),
        other => Err(PacelineError::SerializationError(format!(
            "Unknown backend: {}. Use: redb, memory",
            other
        ))),
    }
}

/// Parse an optional RFC3339 instant, defaulting to now.
fn parse_instant(raw: Option<&str>) -> Result<DateTime<Utc>, PacelineError> {
    match raw {
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                PacelineError::SerializationError(format!(
                    "Invalid RFC3339 timestamp '{}': {}",
                    value, e
                ))
            }),
        None => Ok(Utc::now()),
    }
}

/// Render one policy as a text block.
fn print_policy(policy: &SlaPolicy) {
    println!("Stage:            {}", policy.stage);
    println!("Duration (days):  {}", policy.duration_days);
    println!("Grace (days):     {}", policy.grace_days);
    println!("Extensions:       {}", policy.allow_extensions);
    if policy.allow_extensions {
        println!("  Max:            {}", policy.max_extensions);
        println!("  Days each:      {}", policy.extension_days);
    }
    println!("Active:           {}", policy.is_active);
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(settings: &Settings, host: &str, port: u16) -> Result<(), PacelineError> {
    let engine = load_engine(settings)?;

    println!("Paceline SLA Deadline Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", settings.backend);
    println!("  Database: {:?}", settings.database);
    println!();
    println!("Endpoints:");
    println!("  GET  /health              - Health check");
    println!("  GET  /status              - Engine metrics overview");
    println!("  GET  /policies            - List policies");
    println!("  GET  /policy/{{stage}}      - Show one policy");
    println!("  PUT  /policy              - Create or replace a policy");
    println!("  POST /instance            - Open a stage instance");
    println!("  GET  /instance/{{id}}       - Evaluate an instance");
    println!("  POST /instance/{{id}}/extend - Grant an extension");
    println!("  POST /instance/{{id}}/close  - Close an instance");
    println!("  GET  /metrics             - Prometheus metrics");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, engine, settings.rate_limit).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(settings: &Settings, seed: bool, force: bool) -> Result<(), PacelineError> {
    if settings.backend != "redb" {
        return Err(PacelineError::SerializationError(
            "Nothing to initialize for the memory backend. Use --backend redb.".to_string(),
        ));
    }

    if settings.database.exists() && !force {
        return Err(PacelineError::SerializationError(
            "Database already exists. Use --force to overwrite.".to_string(),
        ));
    }

    if settings.database.exists() {
        std::fs::remove_file(&settings.database)
            .map_err(|e| PacelineError::IoError(format!("Remove old database: {}", e)))?;
    }

    let mut engine = Engine::with_redb(&settings.database)?;
    println!("Initialized new redb database at {:?}", settings.database);

    if seed {
        let count = engine.seed_default_policies()?;
        println!("Seeded {} default policies", count);
    }

    Ok(())
}

// =============================================================================
// POLICY COMMANDS
// =============================================================================

/// Create or replace the policy for a stage.
pub fn cmd_policy_set(
    settings: &Settings,
    stage: &str,
    duration_days: u32,
    grace_days: u32,
    allow_extensions: bool,
    max_extensions: u32,
    extension_days: u32,
    inactive: bool,
) -> Result<(), PacelineError> {
    let mut engine = load_engine(settings)?;

    let policy = SlaPolicy {
        stage: StageName::new(stage),
        duration_days,
        grace_days,
        allow_extensions,
        max_extensions,
        extension_days,
        is_active: !inactive,
    };

    engine.upsert_policy(policy.clone())?;

    if settings.json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&policy).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Policy stored");
    print_policy(&policy);
    Ok(())
}

/// Show the policy for a stage.
pub fn cmd_policy_show(settings: &Settings, stage: &str) -> Result<(), PacelineError> {
    let engine = load_engine(settings)?;
    let policy = engine.policy(&StageName::new(stage))?;

    if settings.json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&policy).unwrap_or_default()
        );
        return Ok(());
    }

    print_policy(&policy);
    Ok(())
}

/// List all policies.
pub fn cmd_policy_list(settings: &Settings) -> Result<(), PacelineError> {
    let engine = load_engine(settings)?;
    let policies = engine.policies()?;

    if settings.json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&policies).unwrap_or_default()
        );
        return Ok(());
    }

    if policies.is_empty() {
        println!("No policies configured. Run `paceline init --seed` for defaults.");
        return Ok(());
    }

    println!("Configured Policies");
    println!("===================");
    for policy in &policies {
        let extensions = if policy.allow_extensions {
            format!("{} x {}d", policy.max_extensions, policy.extension_days)
        } else {
            "disabled".to_string()
        };
        let active = if policy.is_active { "active" } else { "inactive" };
        println!(
            "  {:<24} {:>4}d + {:>3}d grace  extensions: {:<10} [{}]",
            policy.stage.as_str(),
            policy.duration_days,
            policy.grace_days,
            extensions,
            active
        );
    }
    Ok(())
}

// =============================================================================
// OPEN COMMAND
// =============================================================================

/// Open a stage instance.
pub fn cmd_open(
    settings: &Settings,
    stage: &str,
    owner: &str,
    at: Option<&str>,
) -> Result<(), PacelineError> {
    let mut engine = load_engine(settings)?;
    let owner: OwnerRole = owner.parse()?;
    let started_at = parse_instant(at)?;

    let id = engine.open_stage(&StageName::new(stage), owner, started_at)?;

    if settings.json_mode {
        let output = serde_json::json!({
            "id": id.0,
            "stage": stage,
            "owner": owner.as_str(),
            "started_at": started_at.to_rfc3339(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Opened instance {} for stage '{}'", id.0, stage);
    println!("  Owner:      {}", owner.as_str());
    println!("  Started at: {}", started_at.to_rfc3339());
    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Fully evaluate a stage instance at an instant.
pub fn cmd_inspect(settings: &Settings, id: u64, at: Option<&str>) -> Result<(), PacelineError> {
    let engine = load_engine(settings)?;
    let now = parse_instant(at)?;
    let report = engine.inspect(InstanceId(id), now)?;

    if settings.json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Instance {}", id);
    println!("==========={}", "=".repeat(id.to_string().len()));
    println!("Stage:       {}", report.instance.stage);
    println!("Owner:       {}", report.instance.owner.as_str());
    println!("Version:     {}", report.version.value());
    println!("Started at:  {}", report.instance.started_at.to_rfc3339());
    println!("Extensions:  {}", report.instance.extensions_granted);
    println!("Due at:      {}", report.due_at.to_rfc3339());
    println!("Expiry at:   {}", report.expiry_at.to_rfc3339());
    println!("Status:      {}", report.status.as_str());
    println!("Escalation:  {}", report.escalation.as_str());
    if let Some(closure) = report.instance.closed {
        println!(
            "Closed:      {} at {}",
            closure.status.as_str(),
            closure.at.to_rfc3339()
        );
    }
    Ok(())
}

// =============================================================================
// EXTEND COMMAND
// =============================================================================

/// Grant one extension to a stage instance.
pub fn cmd_extend(settings: &Settings, id: u64) -> Result<(), PacelineError> {
    let mut engine = load_engine(settings)?;
    let record = engine.grant_extension(InstanceId(id))?;

    if settings.json_mode {
        let output = serde_json::json!({
            "id": id,
            "version": record.version.value(),
            "extensions_granted": record.instance.extensions_granted,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "Granted extension {} of {} for instance {}",
        record.instance.extensions_granted, record.instance.policy.max_extensions, id
    );
    Ok(())
}

// =============================================================================
// CLOSE COMMAND
// =============================================================================

/// Close a stage instance.
pub fn cmd_close(
    settings: &Settings,
    id: u64,
    status: &str,
    at: Option<&str>,
) -> Result<(), PacelineError> {
    let mut engine = load_engine(settings)?;
    let status: CloseStatus = status.parse()?;
    let at = parse_instant(at)?;

    let record = engine.close(InstanceId(id), status, at)?;

    if settings.json_mode {
        let output = serde_json::json!({
            "id": id,
            "version": record.version.value(),
            "status": status.as_str(),
            "closed_at": at.to_rfc3339(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Closed instance {} as {}", id, status.as_str());
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show engine metrics.
pub fn cmd_status(settings: &Settings) -> Result<(), PacelineError> {
    let engine = load_engine(settings)?;
    let metrics = engine.metrics(Utc::now())?;

    if settings.json_mode {
        let output = serde_json::json!({
            "database": settings.database.to_string_lossy(),
            "backend": settings.backend,
            "policies": metrics.policies,
            "instances": metrics.instances,
            "open": metrics.open,
            "on_time": metrics.on_time,
            "overdue": metrics.overdue,
            "expired": metrics.expired,
            "closed": metrics.closed,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Paceline Engine Status");
    println!("======================");
    println!("Database: {:?}", settings.database);
    println!("Backend:  {}", settings.backend);
    println!();
    println!("Policies:  {}", metrics.policies);
    println!("Instances: {}", metrics.instances);
    println!("  Open:    {}", metrics.open);
    println!("    On time: {}", metrics.on_time);
    println!("    Overdue: {}", metrics.overdue);
    println!("    Expired: {}", metrics.expired);
    println!("  Closed:  {}", metrics.closed);

    Ok(())
}
