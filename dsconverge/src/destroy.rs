use crate::application::Session;
use anyhow::{bail, Context, Result};
use dsconverge_core::{Reconciler, Stage};

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// The type of the object, e.g. `password-storage-scheme`
    object_type: String,
    /// The identifier of the managed object
    id: String,
}

/// Run the `destroy` command. Creatable objects are deleted from the server;
/// singletons are only dropped from management.
pub(crate) async fn destroy(session: &Session, args: &Args) -> Result<()> {
    let schema = session.catalog.get(&args.object_type)?;
    {
        let state = session.state.lock().await;
        if !state.contains(&args.object_type, &args.id) {
            let managed: Vec<String> = state
                .managed()
                .filter(|(object_type, _)| *object_type == args.object_type)
                .map(|(_, id)| format!("'{}'", id))
                .collect();
            if managed.is_empty() {
                bail!("{} '{}' is not managed", args.object_type, args.id);
            }
            bail!(
                "{} '{}' is not managed; managed objects of this type: {}",
                args.object_type,
                args.id,
                managed.join(", ")
            );
        }
    }
    let version = session.server_version(None).await?;
    let reconciler = Reconciler::new(&session.server, schema, version);
    let stage = reconciler
        .delete(&args.id)
        .await
        .with_context(|| format!("destroying {} '{}'", args.object_type, args.id))?;
    session
        .state
        .lock()
        .await
        .forget(schema.object_type(), &args.id, "destroy")?;
    match stage {
        Stage::Abandoned => eprintln!(
            "{} '{}' is no longer managed; it remains on the server.",
            args.object_type, args.id
        ),
        _ => eprintln!("Deleted {} '{}'.", args.object_type, args.id),
    }
    Ok(())
}
