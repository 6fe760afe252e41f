//! 宿主侧动态值模型。
//!
//! ## 设计目标（Why）
//! - 通道的调用面来自动态类型宿主：参数表是字符串键的混合值映射，观测截止时间可以是数字或日期，
//!   回调是可调用对象。该模块以强类型枚举还原这些取值种类，使“种类校验”集中在单一边界完成；
//! - [`ConfigMap`] 保持插入顺序且允许重复键，与宿主对象的迭代语义一致，优先级交由原生消费方决定。
//!
//! ## 契约说明（What）
//! - [`HostValue::kind`] 给出稳定的种类名称，用于错误诊断；
//! - [`HostValue::as_int32`] 实现宿主的 Int32 判定：整值、位于 `i32` 范围且不是负零；
//! - JSON 转换保留对象键顺序（依赖 `serde_json` 的 `preserve_order`）。

use core::fmt;
use std::{sync::Arc, time::SystemTime};

use crate::{
    credentials::ChannelCredentials,
    error::{ChannelError, Result},
    watcher::WatchOutcome,
};

/// 宿主可调用对象，作为观测回调使用。
///
/// 宿主函数本身可以被多次调用；“恰好一次”的保证由观测请求的单次槽位负责。
#[derive(Clone)]
pub struct HostFunction(Arc<dyn Fn(Result<WatchOutcome>) + Send + Sync>);

impl HostFunction {
    pub fn new(f: impl Fn(Result<WatchOutcome>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, result: Result<WatchOutcome>) {
        (self.0)(result)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostFunction(..)")
    }
}

/// 宿主侧值。
#[derive(Clone, Debug)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(SystemTime),
    Array(Vec<HostValue>),
    Object(ConfigMap),
    Credentials(Arc<dyn ChannelCredentials>),
    Function(HostFunction),
}

impl HostValue {
    /// 取值种类名称。
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::Text(_) => "string",
            HostValue::Date(_) => "date",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
            HostValue::Credentials(_) => "credentials",
            HostValue::Function(_) => "function",
        }
    }

    /// 按宿主 Int32 语义解释数值。
    pub fn as_int32(&self) -> Option<i32> {
        match *self {
            HostValue::Number(n) => number_as_int32(n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            HostValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

pub(crate) fn number_as_int32(n: f64) -> Option<i32> {
    let integral = n.is_finite() && n.fract() == 0.0;
    let in_range = n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX);
    let negative_zero = n == 0.0 && n.is_sign_negative();
    (integral && in_range && !negative_zero).then_some(n as i32)
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Number(f64::from(value))
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Text(value.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Text(value)
    }
}

impl From<SystemTime> for HostValue {
    fn from(value: SystemTime) -> Self {
        HostValue::Date(value)
    }
}

impl From<ConfigMap> for HostValue {
    fn from(value: ConfigMap) -> Self {
        HostValue::Object(value)
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(b),
            // 宿主数值均为双精度；超出 f64 精度的整数按宿主语义就近取整。
            Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => HostValue::Text(s),
            Value::Array(items) => HostValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => HostValue::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, HostValue::from(value)))
                    .collect(),
            ),
        }
    }
}

/// 有序、允许重复键的配置映射。
///
/// ### 契约定义（What）
/// - 迭代顺序即插入顺序；
/// - [`push`](Self::push) 不做去重，重复键原样保留。
#[derive(Clone, Debug, Default)]
pub struct ConfigMap {
    entries: Vec<(String, HostValue)>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加条目并返回自身，便于链式构造。
    pub fn with(mut self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<HostValue>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// 从 JSON 对象文本解析参数映射。
    ///
    /// # 契约（What）
    /// - 顶层必须是对象，否则返回 [`ChannelError::InvalidArgumentType`]；
    /// - 键顺序与文本书写顺序一致；取值种类不在此处校验，由编组阶段负责。
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| ChannelError::invalid_type(format!("argument map is not JSON: {err}")))?;
        match HostValue::from(value) {
            HostValue::Object(map) => Ok(map),
            other => Err(ChannelError::invalid_type(format!(
                "argument map must be an object, got {}",
                other.kind()
            ))),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigMap
where
    K: Into<String>,
    V: Into<HostValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
