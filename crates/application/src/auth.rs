use std::sync::Arc;

use domain::Identity;
use tokio::sync::watch;

/// 认证状态提供者
///
/// 对会话核心而言身份是外部输入：这里只广播“当前身份（或无）”，不保存任何凭据。
#[derive(Clone)]
pub struct AuthProvider {
    sender: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for AuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// 登录；重复设置同一身份不会触发通知
    pub fn sign_in(&self, identity: Identity) {
        self.set(Some(identity));
    }

    /// 登出
    pub fn sign_out(&self) {
        self.set(None);
    }

    pub fn current(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.sender.subscribe()
    }

    fn set(&self, identity: Option<Identity>) {
        self.sender.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            tracing::info!(identity = ?identity, "认证状态变化");
            *current = identity;
            true
        });
    }
}
