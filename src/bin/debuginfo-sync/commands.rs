use std::io::Write;
use std::path::PathBuf;

use debuginfo_sync::extract::extract_to_dir;
use debuginfo_sync::sources::write_source_archive;
use debuginfo_sync::store::{GrpcStore, HttpSignedUrlUploader, StoreConfig};
use debuginfo_sync::task::{run_blocking, run_until_signal};
use debuginfo_sync::upload::{UploadOptions, UploadOutcome, Uploader};
use debuginfo_sync::{
    BuildIdResolver, CollectOptions, ElfBuildId, ElfReducer, Error, ExtractMode, collect_artifacts,
};

use crate::args::ValidatedCommand;
use crate::error::AppError;
use crate::progress::{complete_progress_spinner, make_progress_spinner};

pub async fn run(command: ValidatedCommand) -> Result<(), AppError> {
    match command {
        ValidatedCommand::Upload {
            store,
            collect,
            options,
            compress_dwarf_sections,
            paths,
        } => upload(store, collect, options, compress_dwarf_sections, paths).await,
        ValidatedCommand::Extract {
            output_dir,
            mode,
            compress_dwarf_sections,
            paths,
        } => extract(output_dir, mode, compress_dwarf_sections, paths).await,
        ValidatedCommand::BuildId { path } => build_id(path),
        ValidatedCommand::Source {
            debuginfo_path,
            out_path,
        } => source(debuginfo_path, out_path).await,
    }
}

fn report_outcome(outcome: &UploadOutcome) {
    match outcome {
        UploadOutcome::Skipped {
            identifier,
            path,
            reason,
        } => println!(
            "Skipping upload of {:?} with build ID {identifier:?} as the store instructed not to: {reason}",
            path.display().to_string()
        ),
        UploadOutcome::DryRun {
            identifier,
            path,
            reason,
        } => println!(
            "Dry run: would upload {:?} with build ID {identifier:?} ({reason})",
            path.display().to_string()
        ),
        UploadOutcome::Uploaded {
            identifier,
            path,
            size,
            strategy,
            ..
        } => println!(
            "Uploaded {:?} with build ID {identifier:?} ({size} bytes via {strategy})",
            path.display().to_string()
        ),
    }
}

async fn upload(
    store: StoreConfig,
    collect: CollectOptions,
    options: UploadOptions,
    compress_dwarf_sections: bool,
    paths: Vec<PathBuf>,
) -> Result<(), AppError> {
    run_until_signal(|cancel| async move {
        let pb = make_progress_spinner(format!("collecting {} artifact(s)", paths.len()));
        let collected = run_blocking(move || {
            collect_artifacts(
                &paths,
                &collect,
                &ElfBuildId,
                &ElfReducer::new(compress_dwarf_sections),
            )
        })
        .await;
        let count = collected.as_ref().map_or(0, Vec::len);
        complete_progress_spinner(pb, &collected, format!("collected {count} artifact(s)"));
        let mut artifacts = collected.map_err(|err| AppError::command("collect artifacts", err))?;

        let pb = make_progress_spinner(format!("connecting to {}", store.address));
        let connected = cancel
            .run_until_cancelled(GrpcStore::connect(&store))
            .await
            .unwrap_or(Err(Error::Cancelled));
        complete_progress_spinner(pb, &connected, format!("connected to {}", store.address));
        let grpc = connected.map_err(|err| AppError::connect(store.address.clone(), err))?;

        let uploader = Uploader::new(grpc, HttpSignedUrlUploader::default(), options, cancel);
        let pb = make_progress_spinner(format!("uploading {count} artifact(s)"));
        let uploaded = uploader
            .upload_all(&mut artifacts, |outcome| pb.suspend(|| report_outcome(outcome)))
            .await;
        complete_progress_spinner(pb, &uploaded, format!("processed {count} artifact(s)"));
        uploaded.map_err(|err| AppError::command("upload debug information", err.into()))?;
        Ok(())
    })
    .await
}

async fn extract(
    output_dir: PathBuf,
    mode: ExtractMode,
    compress_dwarf_sections: bool,
    paths: Vec<PathBuf>,
) -> Result<(), AppError> {
    run_until_signal(|_| async move {
        let pb = make_progress_spinner(format!(
            "extracting {} file(s) into {}",
            paths.len(),
            output_dir.display()
        ));
        let extracted = run_blocking(move || {
            extract_to_dir(
                &ElfBuildId,
                &ElfReducer::new(compress_dwarf_sections),
                mode,
                &paths,
                &output_dir,
            )
        })
        .await;
        let count = extracted.as_ref().map_or(0, Vec::len);
        complete_progress_spinner(pb, &extracted, format!("extracted {count} file(s)"));
        let written =
            extracted.map_err(|err| AppError::command("extract debug information", err))?;
        for path in written {
            println!("{}", path.display());
        }
        Ok(())
    })
    .await
}

fn build_id(path: PathBuf) -> Result<(), AppError> {
    let id = ElfBuildId
        .build_id(&path)
        .map_err(|err| AppError::command("extract ELF build ID", err))?;
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{id}")?;
    stdout.flush()?;
    Ok(())
}

async fn source(debuginfo_path: PathBuf, out_path: PathBuf) -> Result<(), AppError> {
    run_until_signal(|cancel| async move {
        let pb = make_progress_spinner(format!(
            "archiving sources of {}",
            debuginfo_path.display()
        ));
        let target = out_path.clone();
        let archived =
            run_blocking(move || write_source_archive(&debuginfo_path, &target, &cancel)).await;
        let count = archived.as_ref().map_or(0, |manifest| manifest.archived.len());
        complete_progress_spinner(
            pb,
            &archived,
            format!("archived {count} source file(s) into {}", out_path.display()),
        );
        let manifest =
            archived.map_err(|err| AppError::command("build source archive", err))?;
        println!(
            "Wrote {} source file(s) to {} ({} missing)",
            manifest.archived.len(),
            out_path.display(),
            manifest.missing.len()
        );
        Ok(())
    })
    .await
}
