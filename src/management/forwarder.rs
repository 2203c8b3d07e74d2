//! 事件转发器
//!
//! 监控期间订阅框架的模块事件与服务事件，在投递线程上同步地把每个事件转换为
//! 带序号的 [`Notification`]，发送到广播通道。
//!
//! # 状态机
//!
//! ```text
//! inactive --start()--> active --stop()--> inactive
//! ```
//!
//! - `start()` 不会重复订阅，每次进入 active 时序号从 0 重新开始
//! - `stop()` 幂等；返回后不会再发出任何通知
//! - 模块事件与服务事件共享同一个序号计数器
//! - 广播通道有界，慢速接收者丢弃最旧的通知，不会阻塞事件投递

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use super::notification::{EventKind, Notification, NotificationPayload};
use crate::core::config::NotificationConfig;
use crate::module::{Framework, ListenerId, ModuleEvent, ServiceEvent};
use crate::utils::{ManagementError, Result};

/// 默认通道容量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// 事件回调
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// 可订阅的事件源
///
/// 把"如何挂接监听器、如何摘除、如何转换事件"参数化，模块事件与服务事件
/// 共用同一套订阅逻辑。
pub struct Subscribable<E: 'static> {
    name: &'static str,
    attach: fn(&dyn Framework, Callback<E>) -> ListenerId,
    detach: fn(&dyn Framework, ListenerId) -> bool,
    convert: fn(&E) -> (EventKind, NotificationPayload),
}

impl<E: 'static> Subscribable<E> {
    pub fn new(
        name: &'static str,
        attach: fn(&dyn Framework, Callback<E>) -> ListenerId,
        detach: fn(&dyn Framework, ListenerId) -> bool,
        convert: fn(&E) -> (EventKind, NotificationPayload),
    ) -> Self {
        Self {
            name,
            attach,
            detach,
            convert,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 挂接一个把事件送入闸门的监听器
    fn subscribe(&self, framework: &dyn Framework, gate: Arc<Gate>) -> ListenerId {
        let convert = self.convert;
        let callback: Callback<E> = Arc::new(move |event: &E| {
            let (kind, payload) = convert(event);
            gate.emit(kind, payload);
        });
        (self.attach)(framework, callback)
    }

    fn unsubscribe(&self, framework: &dyn Framework, id: ListenerId) -> bool {
        (self.detach)(framework, id)
    }
}

/// 模块事件源
pub fn module_events() -> Subscribable<ModuleEvent> {
    Subscribable::new(
        "module",
        |framework, callback| framework.add_module_listener(callback),
        |framework, id| framework.remove_module_listener(id),
        |event| {
            (
                EventKind::Module(event.kind),
                NotificationPayload::Module(event.into()),
            )
        },
    )
}

/// 服务事件源
pub fn service_events() -> Subscribable<ServiceEvent> {
    Subscribable::new(
        "service",
        |framework, callback| framework.add_service_listener(callback, None),
        |framework, id| framework.remove_service_listener(id),
        |event| {
            (
                EventKind::Service(event.kind),
                NotificationPayload::Service(event.into()),
            )
        },
    )
}

/// 一次监控期间的发射器
struct Emitter {
    sequence: AtomicU64,
    /// 保证序号分配与发送的顺序一致
    order: Mutex<()>,
    sender: broadcast::Sender<Notification>,
}

impl Emitter {
    fn emit(&self, kind: EventKind, payload: NotificationPayload) {
        let _order = self.order.lock();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let notification = Notification {
            sequence,
            event_kind: kind,
            payload,
            timestamp: Utc::now(),
        };
        trace!(sequence = sequence, event_kind = %kind, "转发通知");
        if self.sender.send(notification).is_err() {
            trace!(sequence = sequence, "当前没有通知接收者");
        }
    }
}

/// 闸门：监听器回调持有读锁发射，`stop` 取写锁关闭
#[derive(Default)]
struct Gate {
    emitter: RwLock<Option<Emitter>>,
}

impl Gate {
    fn emit(&self, kind: EventKind, payload: NotificationPayload) {
        if let Some(emitter) = self.emitter.read().as_ref() {
            emitter.emit(kind, payload);
        }
    }
}

#[derive(Debug, Default)]
struct Subscriptions {
    module: Option<ListenerId>,
    service: Option<ListenerId>,
}

/// 事件转发器
pub struct EventForwarder {
    framework: Arc<dyn Framework>,
    sender: broadcast::Sender<Notification>,
    gate: Arc<Gate>,
    subscriptions: Mutex<Option<Subscriptions>>,
    modules: Subscribable<ModuleEvent>,
    services: Subscribable<ServiceEvent>,
    monitor_modules: bool,
    monitor_services: bool,
}

impl std::fmt::Debug for EventForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventForwarder")
            .field("active", &self.is_active())
            .field("receivers", &self.sender.receiver_count())
            .field("monitor_modules", &self.monitor_modules)
            .field("monitor_services", &self.monitor_services)
            .finish()
    }
}

impl EventForwarder {
    /// 创建转发器，同时监控模块与服务事件
    ///
    /// # Arguments
    ///
    /// * `framework` - 被观察的框架
    /// * `capacity` - 广播通道容量（至少为 1）
    pub fn new(framework: Arc<dyn Framework>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            framework,
            sender,
            gate: Arc::new(Gate::default()),
            subscriptions: Mutex::new(None),
            modules: module_events(),
            services: service_events(),
            monitor_modules: true,
            monitor_services: true,
        }
    }

    /// 按通知配置创建
    pub fn with_config(framework: Arc<dyn Framework>, config: &NotificationConfig) -> Self {
        let mut forwarder = Self::new(framework, config.channel_capacity);
        forwarder.monitor_modules = config.monitor_modules;
        forwarder.monitor_services = config.monitor_services;
        forwarder
    }

    /// 开始监控
    ///
    /// 已在监控中时不做任何操作。
    ///
    /// # Errors
    ///
    /// 模块与服务事件都未启用监控时返回 `InitFailed`
    pub fn start(&self) -> Result<()> {
        if !self.monitor_modules && !self.monitor_services {
            return Err(ManagementError::InitFailed(
                "模块事件与服务事件均未启用监控".to_string(),
            ));
        }

        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.is_some() {
            debug!("事件转发器已在运行");
            return Ok(());
        }

        *self.gate.emitter.write() = Some(Emitter {
            sequence: AtomicU64::new(0),
            order: Mutex::new(()),
            sender: self.sender.clone(),
        });

        let framework = self.framework.as_ref();
        let active = Subscriptions {
            module: self
                .monitor_modules
                .then(|| self.modules.subscribe(framework, self.gate.clone())),
            service: self
                .monitor_services
                .then(|| self.services.subscribe(framework, self.gate.clone())),
        };
        info!(
            modules = active.module.is_some(),
            services = active.service.is_some(),
            "事件转发器已启动"
        );
        *subscriptions = Some(active);
        Ok(())
    }

    /// 停止监控
    ///
    /// 幂等。返回后不会再发出通知：先摘除监听器，再等待正在进行的回调结束并关闭闸门。
    pub fn stop(&self) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock();
        let Some(active) = subscriptions.take() else {
            return Ok(());
        };

        let framework = self.framework.as_ref();
        if let Some(id) = active.module {
            self.modules.unsubscribe(framework, id);
        }
        if let Some(id) = active.service {
            self.services.unsubscribe(framework, id);
        }

        let emitted = self
            .gate
            .emitter
            .write()
            .take()
            .map(|e| e.sequence.load(Ordering::SeqCst))
            .unwrap_or(0);
        info!(emitted = emitted, "事件转发器已停止");
        Ok(())
    }

    /// 是否在监控中
    pub fn is_active(&self) -> bool {
        self.subscriptions.lock().is_some()
    }

    /// 新的通知接收端，只能收到订阅之后发出的通知
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// 本次监控期间已发出的通知数量
    pub fn emitted(&self) -> u64 {
        self.gate
            .emitter
            .read()
            .as_ref()
            .map(|e| e.sequence.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 当前接收端数量
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Drop for EventForwarder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
