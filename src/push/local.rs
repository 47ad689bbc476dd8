use crate::metrics::PassMetrics;
use crate::push::types::PushOptions;
use crate::sync::source::{create_output, open_file};
use crate::sync::{
    reconstruct, DeltaBuilder, ReconstructContext, ReferenceSource, SignatureBuilder, SourceRole,
    SyncError, SyncResult,
};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Bring `old_path` (or the result path) up to date with `new_path`.
///
/// The old file is indexed, the new file matched against it and the result
/// reconstructed from the old file plus the delta. Without a result path the
/// result replaces the old file once it is complete; a failed pass leaves
/// the old file untouched and removes any partial output.
pub fn local_push(
    new_path: &Path,
    old_path: &Path,
    options: &PushOptions,
) -> SyncResult<ReconstructContext> {
    let mut ctx = ReconstructContext::new(&options.config)?;
    let span = tracing::info_span!("local_push", session = %ctx.session_id);
    let _enter = span.enter();

    if new_path == old_path {
        return Err(SyncError::BadCall(format!(
            "new and old file are the same: {}",
            new_path.display()
        )));
    }
    if options.result_path.as_deref() == Some(new_path) {
        return Err(SyncError::BadCall(format!(
            "result path would overwrite the new file: {}",
            new_path.display()
        )));
    }

    let new_file = open_file(new_path, SourceRole::New)?;
    let new_size = new_file.metadata()?.len();
    let metrics = PassMetrics::start(new_size);

    match run_push(&mut ctx, new_file, new_size, old_path, options) {
        Ok(()) => {
            let elapsed = metrics.elapsed();
            metrics.complete(&ctx);
            tracing::info!(
                new = %new_path.display(),
                old = %old_path.display(),
                size = new_size,
                references = ctx.delta.reference_count,
                raw_bytes = ctx.delta.raw_bytes,
                force_created = ctx.force_created,
                elapsed_ms = elapsed.as_millis() as u64,
                "push complete"
            );
            Ok(ctx)
        }
        Err(err) => {
            metrics.fail(err.label());
            Err(err)
        }
    }
}

/// Run [`local_push`] on the blocking pool.
pub async fn local_push_async(
    new_path: PathBuf,
    old_path: PathBuf,
    options: PushOptions,
) -> SyncResult<ReconstructContext> {
    tokio::task::spawn_blocking(move || local_push(&new_path, &old_path, &options))
        .await
        .map_err(|e| SyncError::Io(io::Error::other(e)))?
}

fn temp_path_for(old_path: &Path) -> SyncResult<PathBuf> {
    let name = old_path.file_name().ok_or_else(|| {
        SyncError::BadCall(format!("old path has no file name: {}", old_path.display()))
    })?;
    Ok(old_path.with_file_name(format!(".{}.deltasync.tmp", name.to_string_lossy())))
}

fn run_push(
    ctx: &mut ReconstructContext,
    new_file: File,
    new_size: u64,
    old_path: &Path,
    options: &PushOptions,
) -> SyncResult<()> {
    let result_path = options
        .result_path
        .as_deref()
        .filter(|path| *path != old_path);
    let (output_path, replace_old) = match result_path {
        Some(path) => (path.to_path_buf(), false),
        None => (temp_path_for(old_path)?, true),
    };

    let old_file = match File::open(old_path) {
        Ok(file) => Some(file),
        Err(e) if e.kind() == ErrorKind::NotFound && options.force_create_reference => None,
        Err(source) => {
            return Err(SyncError::OpenFailure {
                role: SourceRole::Old,
                path: old_path.to_path_buf(),
                source,
            })
        }
    };

    let output = create_output(&output_path)?;
    let outcome = match old_file {
        Some(old_file) => sync_files(ctx, new_file, new_size, old_file, output),
        None => {
            tracing::warn!(
                old = %old_path.display(),
                "old file missing, copying new file whole"
            );
            copy_whole(ctx, new_file, new_size, output)
        }
    };

    let outcome = outcome.and_then(|()| {
        if replace_old {
            fs::rename(&output_path, old_path)?;
        }
        Ok(())
    });

    if outcome.is_err() {
        // Best effort; the original error is what matters.
        let _ = fs::remove_file(&output_path);
    }
    outcome
}

fn sync_files(
    ctx: &mut ReconstructContext,
    new_file: File,
    new_size: u64,
    old_file: File,
    output: File,
) -> SyncResult<()> {
    let mut reference = ReferenceSource::from_seekable(old_file)?;
    let index = SignatureBuilder::new()
        .block_size(ctx.block_size)
        .build_from_source(&mut reference)?;
    ctx.index_entries = index.block_count() as u64;

    let mut stream = DeltaBuilder::new(&index, ctx.match_params())
        .source(BufReader::new(new_file), new_size)
        .stream()?;

    let mut writer = BufWriter::new(output);
    let written = reconstruct(stream.by_ref(), &mut reference, &mut writer, ctx)?;
    ctx.record_match(stream.stats());

    if written != new_size {
        return Err(SyncError::SizeMismatch {
            expected: new_size,
            actual: written,
        });
    }

    Ok(())
}

fn copy_whole(
    ctx: &mut ReconstructContext,
    new_file: File,
    new_size: u64,
    output: File,
) -> SyncResult<()> {
    let mut reader = BufReader::new(new_file);
    let mut writer = BufWriter::new(output);
    let mut buffer = vec![0u8; 64 * 1024];
    let mut copied = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(SyncError::OutputWrite)?;
        copied += n as u64;
    }
    writer.flush().map_err(SyncError::OutputWrite)?;

    if copied != new_size {
        return Err(SyncError::UnexpectedEof {
            offset: copied,
            expected: new_size,
            actual: copied,
        });
    }

    ctx.force_created = true;
    ctx.bytes_written = copied;
    Ok(())
}
