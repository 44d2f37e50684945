use crate::application::Session;
use anyhow::{bail, Context, Result};
use dsconverge_core::Reconciler;

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// The type of the object, e.g. `password-storage-scheme`
    object_type: String,
    /// The identifier of the object on the server
    id: String,
}

/// Run the `import` command: bring an object that already exists on the
/// server under management.
pub(crate) async fn import(session: &Session, args: &Args) -> Result<()> {
    let schema = session.catalog.get(&args.object_type)?;
    if session.state.lock().await.contains(&args.object_type, &args.id) {
        bail!("{} '{}' is already managed", args.object_type, args.id);
    }
    let version = session.server_version(None).await?;
    let reconciler = Reconciler::new(&session.server, schema, version);
    let observed = reconciler
        .import(&args.id)
        .await
        .with_context(|| format!("importing {} '{}'", args.object_type, args.id))?;
    session
        .state
        .lock()
        .await
        .record(schema.object_type(), &observed, "import")?;
    eprintln!(
        "Imported {} '{}' ({}).",
        args.object_type,
        args.id,
        observed.discriminator()
    );
    Ok(())
}
