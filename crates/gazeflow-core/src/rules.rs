use crate::action::{Action, RecordingKind};
use crate::config::{RecordingDef, StudyConfig};
use crate::table::{ActionRule, ConfigGate, Invalidation, RecordingGate, Requirement};

// ---------------------------------------------------------------------------
// Helper macros for concise rule definitions
// ---------------------------------------------------------------------------

macro_rules! rule {
    (
        action: $action:expr,
        requires: $req:expr,
        invalidates: $inv:expr
        $(, config_gate: $gate:expr)?
        $(, recording_gate: $rgate:expr)?
    ) => {
        ActionRule {
            action: $action,
            preconditions: $req,
            invalidation: $inv,
            config_gate: {
                #[allow(unused_assignments, unused_mut)]
                let mut v: ConfigGate = always;
                $(v = $gate;)?
                v
            },
            recording_gate: {
                #[allow(unused_assignments, unused_mut)]
                let mut v: RecordingGate = any_recording;
                $(v = $rgate;)?
                v
            },
        }
    };
}

// ---------------------------------------------------------------------------
// Gate helpers
// ---------------------------------------------------------------------------

fn always(_: &StudyConfig) -> bool {
    true
}

fn any_recording(_: &RecordingDef, _: &StudyConfig) -> bool {
    true
}

/// Actions that consume gaze data make no sense for scene cameras.
fn has_gaze(rec: &RecordingDef, _: &StudyConfig) -> bool {
    rec.kind == RecordingKind::EyeTracker
}

// ---------------------------------------------------------------------------
// Precondition helpers
// ---------------------------------------------------------------------------

fn completed(actions: &[Action]) -> Vec<Requirement> {
    actions.iter().copied().map(Requirement::Completed).collect()
}

/// Every recording action other than import itself needs imported data.
fn after_import(actions: &[Action]) -> Vec<Requirement> {
    let mut reqs = vec![Requirement::Completed(Action::Import)];
    reqs.extend(completed(actions));
    reqs
}

// ---------------------------------------------------------------------------
// Default rules (catalog order)
// ---------------------------------------------------------------------------

pub fn default_rules() -> Vec<ActionRule> {
    vec![
        rule! {
            action: Action::Import,
            requires: |_| Vec::new(),
            invalidates: Invalidation::Later { except: |_| Vec::new() }
        },
        rule! {
            action: Action::MakeOverlayVideo,
            requires: |_| after_import(&[]),
            invalidates: Invalidation::Nothing,
            recording_gate: has_gaze
        },
        // Manual coding reviews whatever the automatic coders produced, so
        // it waits for them. Unconfigured coders drop out via their gates.
        rule! {
            action: Action::CodeEpisodes,
            requires: |_| after_import(&[Action::AutoCodeSync, Action::AutoCodeTrials]),
            invalidates: Invalidation::Later {
                except: |cfg| {
                    let mut spared = vec![Action::AutoCodeSync, Action::AutoCodeTrials];
                    // With automatic coding the whole recording is analysed,
                    // so marker detection does not depend on coded episodes.
                    if cfg.has_auto_coding() {
                        spared.push(Action::DetectMarkers);
                    }
                    spared
                }
            }
        },
        rule! {
            action: Action::DetectMarkers,
            requires: |cfg| {
                if cfg.has_auto_coding() {
                    after_import(&[])
                } else {
                    after_import(&[Action::CodeEpisodes])
                }
            },
            invalidates: Invalidation::Later {
                except: |cfg| {
                    let mut spared = vec![Action::SyncToReference];
                    if cfg.redetects_markers_for_mapped_video() {
                        spared.push(Action::MakeMappedVideo);
                    }
                    spared
                }
            }
        },
        rule! {
            action: Action::GazeToPlane,
            requires: |_| after_import(&[Action::DetectMarkers, Action::CodeEpisodes]),
            invalidates: Invalidation::Later {
                except: |_| vec![
                    Action::AutoCodeSync,
                    Action::AutoCodeTrials,
                    Action::SyncToCam,
                    Action::SyncToReference,
                ]
            },
            recording_gate: has_gaze
        },
        rule! {
            action: Action::AutoCodeSync,
            requires: |_| after_import(&[Action::DetectMarkers]),
            invalidates: Invalidation::Later {
                except: |_| vec![Action::AutoCodeTrials]
            },
            config_gate: |cfg| cfg.auto_code_sync.is_some()
        },
        // With a sync reference, trials are coded once on the reference
        // and propagated to the other recordings by the sync step.
        rule! {
            action: Action::AutoCodeTrials,
            requires: |_| after_import(&[Action::DetectMarkers]),
            invalidates: Invalidation::Later {
                except: |_| vec![Action::SyncToCam, Action::SyncToReference]
            },
            config_gate: |cfg| cfg.auto_code_trials.is_some(),
            recording_gate: |rec, cfg| {
                cfg.sync_ref_recording.is_none() || cfg.is_sync_ref(&rec.name)
            }
        },
        rule! {
            action: Action::SyncToCam,
            requires: |_| after_import(&[Action::CodeEpisodes]),
            invalidates: Invalidation::Later { except: |_| Vec::new() },
            config_gate: |cfg| cfg.et_cam_sync.is_some(),
            recording_gate: has_gaze
        },
        rule! {
            action: Action::SyncToReference,
            requires: |_| completed(&[Action::CodeEpisodes, Action::SyncToCam]),
            invalidates: Invalidation::Later { except: |_| Vec::new() },
            config_gate: |cfg| cfg.sync_ref_recording.is_some()
        },
        rule! {
            action: Action::Validate,
            requires: |_| after_import(&[Action::GazeToPlane, Action::SyncToReference]),
            invalidates: Invalidation::Later {
                except: |_| vec![Action::MakeMappedVideo]
            },
            config_gate: |cfg| cfg.validation.is_some(),
            recording_gate: has_gaze
        },
        // Export needs at least one producer of exportable gaze data.
        rule! {
            action: Action::ExportTrials,
            requires: |_| vec![
                Requirement::AnyCompleted(&[Action::GazeToPlane, Action::Validate]),
                Requirement::Completed(Action::SyncToReference),
            ],
            invalidates: Invalidation::Nothing
        },
        rule! {
            action: Action::MakeMappedVideo,
            requires: |_| completed(&[
                Action::DetectMarkers,
                Action::GazeToPlane,
                Action::SyncToReference,
            ]),
            invalidates: Invalidation::Nothing,
            config_gate: |cfg| cfg.mapped_video.is_some()
        },
    ]
}
