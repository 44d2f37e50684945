use std::path::PathBuf;

use crate::{application::Session, plan::PlanFile};
use anyhow::{bail, Context, Result};
use dsconverge_core::{
    schema, ObjectSchema, Planned, Reconciled, Reconciler, VariantInstance, Version,
};
use futures_util::future;
use tracing::info;

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// The plan file describing the desired objects
    plan: PathBuf,
}

/// Validate every object of the plan before anything is sent to the server.
fn validate_all(desired: &[(&ObjectSchema, VariantInstance)], version: &Version) -> Result<()> {
    let errors: Vec<String> = desired
        .iter()
        .filter_map(|(schema, instance)| {
            schema::validate(schema, instance, version)
                .err()
                .map(|e| format!("{} '{}': {}", schema.object_type(), instance.id(), e))
        })
        .collect();
    if !errors.is_empty() {
        bail!("The plan is invalid:\n  {}", errors.join("\n  "));
    }
    Ok(())
}

/// Run the `validate` command.
pub(crate) async fn validate(session: &Session, args: &Args) -> Result<()> {
    let plan = PlanFile::load(&args.plan)?;
    let version = session.server_version(plan.server_version).await?;
    let desired = plan.desired(&session.catalog)?;
    validate_all(&desired, &version)?;
    eprintln!(
        "{} object(s) valid for server version {}.",
        desired.len(),
        version
    );
    Ok(())
}

/// Run the `plan` command: show what `apply` would do.
pub(crate) async fn plan(session: &Session, args: &Args) -> Result<()> {
    let plan = PlanFile::load(&args.plan)?;
    let version = session.server_version(plan.server_version).await?;
    let desired = plan.desired(&session.catalog)?;
    validate_all(&desired, &version)?;

    for (schema, instance) in &desired {
        let existing = session.state.lock().await.get(schema, instance.id())?;
        let reconciler = Reconciler::new(&session.server, schema, version);
        let planned = reconciler
            .plan(instance, existing.as_ref())
            .await
            .with_context(|| format!("planning {} '{}'", schema.object_type(), instance.id()))?;
        let name = format!("{} '{}'", schema.object_type(), instance.id());
        match planned {
            Planned::Create { request } => {
                println!("+ {} will be created", name);
                for (attribute, value) in request.attributes() {
                    println!("    {} = {}", attribute, value);
                }
            }
            Planned::Update { ops, .. } => {
                println!("~ {} will be updated", name);
                for op in ops {
                    println!("    {}", op);
                }
            }
            Planned::NoChanges { .. } => println!("  {} is up to date", name),
        }
    }
    Ok(())
}

/// Run the `apply` command.
pub(crate) async fn apply(session: &Session, args: &Args) -> Result<()> {
    let plan = PlanFile::load(&args.plan)?;
    let version = session.server_version(plan.server_version).await?;
    let desired = plan.desired(&session.catalog)?;
    validate_all(&desired, &version)?;

    if desired.is_empty() {
        eprintln!("The plan contains no objects; nothing to apply.");
        return Ok(());
    }

    let results = future::join_all(
        desired
            .iter()
            .map(|(schema, instance)| apply_one(session, schema, instance, version)),
    )
    .await;

    let failures: Vec<String> = results
        .into_iter()
        .filter_map(|r| r.err().map(|e| format!("{:#}", e)))
        .collect();
    if !failures.is_empty() {
        bail!(
            "{} of {} object(s) failed to converge:\n  {}",
            failures.len(),
            desired.len(),
            failures.join("\n  ")
        );
    }
    Ok(())
}

/// Reconcile one object and record the outcome. Objects are independent, so
/// one failure does not stop the others.
async fn apply_one(
    session: &Session,
    schema: &ObjectSchema,
    desired: &VariantInstance,
    version: Version,
) -> Result<Reconciled> {
    let name = format!("{} '{}'", schema.object_type(), desired.id());
    let existing = session.state.lock().await.get(schema, desired.id())?;
    let reconciler = Reconciler::new(&session.server, schema, version);
    let reconciled = reconciler
        .reconcile(desired, existing.as_ref())
        .await
        .with_context(|| name.clone())?;
    session
        .state
        .lock()
        .await
        .record(schema.object_type(), &reconciled.observed, "apply")?;
    info!(
        object = %name,
        entry = %reconciled.entry,
        operations = reconciled.applied.len(),
        "converged"
    );
    Ok(reconciled)
}
