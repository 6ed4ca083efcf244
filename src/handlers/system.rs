use tracing::{debug, info, trace};

use crate::chunks::{
    CompactState, McpServerState, McpServerStatus, SessionInit, TaskNotification, UIMessageChunk,
};
use crate::events::{InitInfo, SystemMessage, TaskNotificationInfo};

use super::SessionContext;

const COMPACTING_STATUS: &str = "compacting";

pub struct SystemHandler;

impl SystemHandler {
    pub fn handle(ctx: &mut SessionContext, msg: &SystemMessage, out: &mut Vec<UIMessageChunk>) {
        match msg {
            SystemMessage::Init(init) => {
                out.push(UIMessageChunk::SessionInit(session_init(init)));
            }
            SystemMessage::Status(status) => {
                if status.status.as_deref() == Some(COMPACTING_STATUS) {
                    let id = ctx.compact.start_compacting();
                    debug!(compact_id = %id, "compaction_started");
                    out.push(UIMessageChunk::system_compact(id, CompactState::InputStreaming));
                } else {
                    trace!(status = ?status.status, "system_status");
                }
            }
            SystemMessage::CompactBoundary(boundary) => match ctx.compact.finish_compacting() {
                Some(id) => {
                    let meta = boundary.compact_metadata.as_ref();
                    debug!(
                        compact_id = %id,
                        trigger = ?meta.and_then(|m| m.trigger.as_deref()),
                        pre_tokens = ?meta.and_then(|m| m.pre_tokens),
                        "compaction_finished"
                    );
                    out.push(UIMessageChunk::system_compact(id, CompactState::OutputAvailable));
                }
                None => debug!("compact_boundary_without_start"),
            },
            SystemMessage::TaskNotification(task) => {
                out.push(UIMessageChunk::TaskNotification(task_notification(task)));
            }
            SystemMessage::Other => trace!("unknown_system_subtype"),
        }
    }
}

fn session_init(init: &InitInfo) -> SessionInit {
    let mcp_servers = init
        .mcp_servers
        .iter()
        .filter_map(|server| match McpServerState::parse(&server.status) {
            Some(status) => Some(McpServerStatus {
                name: server.name.clone(),
                status,
            }),
            None => {
                debug!(server = %server.name, status = %server.status, "mcp_server_status_dropped");
                None
            }
        })
        .collect();

    info!(
        session_id = ?init.session_id,
        model = ?init.model,
        tools = init.tools.len(),
        "session_init"
    );

    SessionInit {
        tools: init.tools.clone(),
        mcp_servers,
        plugins: init.plugins.clone(),
        skills: init.skills.clone(),
        session_id: init.session_id.clone(),
        model: init.model.clone(),
        cwd: init.cwd.clone(),
        permission_mode: init.permission_mode.clone(),
        slash_commands: init.slash_commands.clone(),
    }
}

fn task_notification(task: &TaskNotificationInfo) -> TaskNotification {
    TaskNotification {
        task_id: task.task_id.clone(),
        shell_id: task.shell_id.clone().unwrap_or_else(|| task.task_id.clone()),
        status: task.status.clone(),
        output_file: task.output_file.clone(),
        summary: task.summary.clone(),
        command: task.command.clone(),
    }
}
