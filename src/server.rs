use anyhow::{bail, Result};
use serde_json::json;
use std::io::{BufRead, Write};

use crate::daemon::DaemonClient;
use crate::debug_log;
use crate::manifest::{self, ComponentKind};

pub struct ServerState {
    daemon: DaemonClient,
}

impl ServerState {
    pub fn new(daemon: DaemonClient) -> Self {
        Self { daemon }
    }

    fn tool_list(&self, id: serde_json::Value) -> serde_json::Value {
        let instance_id = json!({
            "type": "string",
            "description": "A unique string id identifying one loaded jadx instance."
        });
        let class_name = json!({
            "type": "string",
            "description": "JVM class descriptor, e.g. `Lcom/example/abc/SomeClass;`."
        });
        let method_name = json!({
            "type": "string",
            "description": "Full JVM method signature, e.g. `Lcom/example/abc;->testMethod(Ljava/lang/String;I)V`."
        });

        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tools": [
                    {
                        "name": "health",
                        "description": "Health check against the jadx daemon.",
                        "inputSchema": { "type": "object", "properties": {} }
                    },
                    {
                        "name": "load",
                        "description": "Load a single apk or dex file into the jadx decompiler.",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "instanceId": instance_id,
                                "filePath": { "type": "string", "description": "Full path of the single apk or dex file." }
                            },
                            "required": ["instanceId", "filePath"]
                        }
                    },
                    {
                        "name": "load_dir",
                        "description": "Load a directory containing apks and dexs into the jadx decompiler.",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "instanceId": instance_id,
                                "dirPath": { "type": "string", "description": "Full path of the directory to load." }
                            },
                            "required": ["instanceId", "dirPath"]
                        }
                    },
                    {
                        "name": "unload",
                        "description": "Unload one jadx instance by instance id.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id },
                            "required": ["instanceId"]
                        }
                    },
                    {
                        "name": "unload_all",
                        "description": "Unload all instances from the jadx decompiler.",
                        "inputSchema": { "type": "object", "properties": {} }
                    },
                    {
                        "name": "get_manifest",
                        "description": "Get the AndroidManifest.xml file content.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id },
                            "required": ["instanceId"]
                        }
                    },
                    {
                        "name": "get_all_exported_activities",
                        "description": "Get all exported activity names from the APK manifest.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id },
                            "required": ["instanceId"]
                        }
                    },
                    {
                        "name": "get_all_exported_services",
                        "description": "Get all exported service names from the APK manifest.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id },
                            "required": ["instanceId"]
                        }
                    },
                    {
                        "name": "get_method_decompiled_code",
                        "description": "Get the decompiled code of the given java method.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "methodName": method_name },
                            "required": ["instanceId", "methodName"]
                        }
                    },
                    {
                        "name": "get_class_decompiled_code",
                        "description": "Get the decompiled code of the given java class.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "className": class_name },
                            "required": ["instanceId", "className"]
                        }
                    },
                    {
                        "name": "get_class_smali_code",
                        "description": "Get the smali code of the given java class.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "className": class_name },
                            "required": ["instanceId", "className"]
                        }
                    },
                    {
                        "name": "get_superclass",
                        "description": "Get the superclass of the given java class.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "className": class_name },
                            "required": ["instanceId", "className"]
                        }
                    },
                    {
                        "name": "get_interfaces",
                        "description": "Get the interfaces of the given java class.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "className": class_name },
                            "required": ["instanceId", "className"]
                        }
                    },
                    {
                        "name": "get_class_methods",
                        "description": "Get the method list of the given java class.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "className": class_name },
                            "required": ["instanceId", "className"]
                        }
                    },
                    {
                        "name": "get_class_fields",
                        "description": "Get the field list of the given java class.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "className": class_name },
                            "required": ["instanceId", "className"]
                        }
                    },
                    {
                        "name": "get_method_callers",
                        "description": "Get the caller list of the given java method.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "methodName": method_name },
                            "required": ["instanceId", "methodName"]
                        }
                    },
                    {
                        "name": "get_class_callers",
                        "description": "Get the caller list of the given java class.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "className": class_name },
                            "required": ["instanceId", "className"]
                        }
                    },
                    {
                        "name": "get_method_overrides",
                        "description": "Get the override list of the given java method.",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "instanceId": instance_id, "methodName": method_name },
                            "required": ["instanceId", "methodName"]
                        }
                    },
                    {
                        "name": "update_max_instance_count",
                        "description": "Update the max parallel jadx instance count. Large values use lots of memory and may OOM the daemon.",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "count": { "type": "integer", "description": "New max instance count, at least 1." }
                            },
                            "required": ["count"]
                        }
                    }
                ]
            }
        })
    }

    fn tool_call(&mut self, id: serde_json::Value, params: &serde_json::Value) -> serde_json::Value {
        let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        let ok = |text: String| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{"type":"text","text": text }], "isError": false }
            })
        };

        let err = |msg: String| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{"type":"text","text": msg }], "isError": true }
            })
        };

        let arg_str = |key: &str| -> Option<&str> { args.get(key).and_then(|v| v.as_str()) };

        // Most tools are straight relays: one daemon route, same parameters,
        // the daemon's JSON reply (result or error object) forwarded verbatim.
        let relayed = match name {
            "health" => Some(self.relay("health", &[])),
            "unload_all" => Some(self.relay("unload_all", &[])),
            "load" => {
                let (Some(instance_id), Some(file_path)) = (arg_str("instanceId"), arg_str("filePath")) else {
                    return err("Missing instanceId or filePath".to_string());
                };
                Some(self.relay("load", &[("instanceId", instance_id), ("filePath", file_path)]))
            }
            "load_dir" => {
                let (Some(instance_id), Some(dir_path)) = (arg_str("instanceId"), arg_str("dirPath")) else {
                    return err("Missing instanceId or dirPath".to_string());
                };
                Some(self.relay("load_dir", &[("instanceId", instance_id), ("dirPath", dir_path)]))
            }
            "unload" | "get_manifest" => {
                let Some(instance_id) = arg_str("instanceId") else {
                    return err("Missing instanceId".to_string());
                };
                Some(self.relay(name, &[("instanceId", instance_id)]))
            }
            "get_class_decompiled_code" | "get_class_smali_code" | "get_superclass"
            | "get_interfaces" | "get_class_methods" | "get_class_fields" | "get_class_callers" => {
                let (Some(instance_id), Some(class_name)) = (arg_str("instanceId"), arg_str("className")) else {
                    return err("Missing instanceId or className".to_string());
                };
                Some(self.relay(name, &[("instanceId", instance_id), ("className", class_name)]))
            }
            "get_method_decompiled_code" | "get_method_callers" | "get_method_overrides" => {
                let (Some(instance_id), Some(method_name)) = (arg_str("instanceId"), arg_str("methodName")) else {
                    return err("Missing instanceId or methodName".to_string());
                };
                Some(self.relay(name, &[("instanceId", instance_id), ("methodName", method_name)]))
            }
            "update_max_instance_count" => {
                let Some(count) = args.get("count").and_then(|v| v.as_u64()) else {
                    return err("Missing count".to_string());
                };
                Some(self.relay("update_max_instance_count", &[("count", &count.to_string())]))
            }
            _ => None,
        };
        if let Some(outcome) = relayed {
            return match outcome {
                Ok(text) => ok(text),
                Err(e) => err(format!("{name} failed: {e:#}")),
            };
        }

        match name {
            "get_all_exported_activities" | "get_all_exported_services" => {
                let Some(instance_id) = arg_str("instanceId") else {
                    return err("Missing instanceId".to_string());
                };
                let kind = if name == "get_all_exported_activities" {
                    ComponentKind::Activity
                } else {
                    ComponentKind::Service
                };
                match self.exported_from_daemon(instance_id, kind) {
                    Ok(reply) => ok(reply.to_string()),
                    Err(e) => err(format!("{name} failed: {e:#}")),
                }
            }
            _ => err(format!("Tool not found: {name}")),
        }
    }

    fn relay(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String> {
        let reply = self.daemon.get(endpoint, params)?;
        Ok(reply.to_string())
    }

    /// Fetch the manifest for an instance and run the export analysis.
    ///
    /// An upstream error object skips sanitization and parsing entirely and
    /// is passed through unchanged; a local extraction failure becomes an
    /// `{"error": ...}` object of its own.
    fn exported_from_daemon(
        &self,
        instance_id: &str,
        kind: ComponentKind,
    ) -> Result<serde_json::Value> {
        let reply = self.daemon.get("get_manifest", &[("instanceId", instance_id)])?;
        if reply.get("error").is_some() {
            return Ok(reply);
        }
        let Some(raw) = reply.get("result").and_then(|v| v.as_str()) else {
            bail!("daemon reply to get_manifest has neither `result` text nor `error`");
        };
        match manifest::exported_components(raw, kind) {
            Ok(names) => Ok(json!({ "result": names })),
            Err(e) => Ok(json!({ "error": e.to_string() })),
        }
    }
}

pub fn run_stdio_server(daemon: DaemonClient) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    let mut state = ServerState::new(daemon);

    for line in stdin.lock().lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }

        let msg: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                debug_log!("skipping malformed JSON-RPC line: {e}");
                continue;
            }
        };

        // JSON-RPC notifications have no "id" field — don't respond.
        let has_id = msg.get("id").is_some();
        if !has_id {
            // Side-effect-only notifications (initialize ack, cancel, log, etc.) — ignore.
            continue;
        }

        let id = msg.get("id").cloned().unwrap_or(json!(null));
        let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");

        let reply = match method {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": msg.get("params").and_then(|p| p.get("protocolVersion")).cloned().unwrap_or(json!("2024-11-05")),
                    "capabilities": { "tools": { "listChanged": true } },
                    "serverInfo": { "name": "jadx-mcp", "version": env!("CARGO_PKG_VERSION") }
                }
            }),
            "ping" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {}
            }),
            "tools/list" => state.tool_list(id),
            "tools/call" => {
                let params = msg.get("params").cloned().unwrap_or(json!({}));
                state.tool_call(id, &params)
            }
            // Return empty lists for resources/prompts — we don't implement them.
            "resources/list" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "resources": [] }
            }),
            "prompts/list" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "prompts": [] }
            }),
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("Method not found: {method}") }
            }),
        };

        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }

    Ok(())
}
