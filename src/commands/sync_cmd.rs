use clap::Args;

use crate::config::Config;
use crate::remote::RemoteStore;
use crate::sync::DiaryService;

#[derive(Args)]
pub struct SyncCommand {
    /// Sync even when the reachability probe fails
    #[arg(long)]
    pub force: bool,
}

impl SyncCommand {
    pub async fn run<R: RemoteStore>(
        &self,
        service: &mut DiaryService<R>,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if !config.remote.is_configured() {
            println!("Sync not configured. Add remote.base_url and remote.api_key to config.");
            return Ok(());
        }
        if config.owner_id.is_none() {
            println!("Sync requires owner_id in config.");
            return Ok(());
        }

        let online = service.refresh_connectivity().await;
        if !online && !self.force {
            println!(
                "Backend unreachable, skipping sync ({} operation(s) pending)",
                service.pending_sync_count()
            );
            return Ok(());
        }

        service.sync_remote(self.force).await?;

        let pending = service.pending_sync_count();
        if pending == 0 {
            println!("Sync complete.");
        } else {
            println!("Sync finished with {} operation(s) still pending.", pending);
        }
        Ok(())
    }
}
