use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::demux::SampleTable;
use crate::errors::PipelineError;
use crate::layout::OutputLayout;
use crate::tree::copy_tree;

/// Copies each project's read tree and QC tree into its group's storage.
/// Trees already delivered are left alone. The analysis scaffold is
/// created only when the QC tree is delivered for the first time.
/// Returns the group run directories, one per distinct group.
pub fn transfer_data(layout: &OutputLayout, samples: &SampleTable, reference: &str) -> Result<Vec<PathBuf>> {
    let mut delivered: Vec<PathBuf> = Vec::new();

    for project in samples.projects() {
        let no_group = || PipelineError::Manifest(format!("cannot derive a group from project {:?}", project));

        let group_run_dir = layout.group_run_dir(project).ok_or_else(no_group)?;
        if !group_run_dir.exists() {
            fs::create_dir_all(&group_run_dir).with_context(|| format!("creating {:?}", group_run_dir))?;
        }

        let project_dest = layout.delivered_project_dir(project).ok_or_else(no_group)?;
        if !project_dest.exists() {
            let project_src = layout.project_dir(project);
            log::info!("transferring {:?} to {:?}", project_src, project_dest);
            copy_tree(&project_src, &project_dest)?;
        } else {
            log::warn!("{:?} already delivered", project_dest);
        }

        let qc_dest = layout.delivered_qc_dir(project).ok_or_else(no_group)?;
        if !qc_dest.exists() {
            let qc_src = layout.qc_project_dir(project);
            log::info!("transferring {:?} to {:?}", qc_src, qc_dest);
            copy_tree(&qc_src, &qc_dest)?;

            let mapping_dir = layout.mapping_dir(project, reference).ok_or_else(no_group)?;
            fs::create_dir_all(&mapping_dir).with_context(|| format!("creating {:?}", mapping_dir))?;
        }

        if !delivered.contains(&group_run_dir) {
            delivered.push(group_run_dir);
        }
    }

    Ok(delivered)
}
