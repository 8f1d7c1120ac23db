//! 应用写操作工具
//!
//! 代表一次对第三方应用的变更（创建、邀请、投票等），声明 requires_approval，
//! 执行器请求它时回合挂起等待人工审批。已执行的操作记录在内存中便于核对。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

pub struct AppActionTool {
    name: String,
    description: String,
    performed: Arc<Mutex<Vec<Value>>>,
}

impl AppActionTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            performed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 共享的已执行记录句柄
    pub fn performed(&self) -> Arc<Mutex<Vec<Value>>> {
        Arc::clone(&self.performed)
    }
}

#[async_trait]
impl Tool for AppActionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        self.performed
            .lock()
            .map_err(|e| e.to_string())?
            .push(args.clone());
        Ok(serde_json::json!({ "status": "done", "action": self.name, "parameters": args }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_performed_actions() {
        let tool = AppActionTool::new("create_program", "Create a program");
        let log = tool.performed();
        assert!(tool.requires_approval());
        let out = tool.execute(serde_json::json!({"name": "Grants"})).await.unwrap();
        assert!(out.contains("\"status\":\"done\""));
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
