//! # 通道参数编组（Argument Marshaller）
//!
//! ## 核心意图（Why）
//! - 将宿主侧字符串键、混合取值的配置映射转换为原生层可消费的有序参数列表；
//! - 种类校验集中在 [`marshal`] 这一处边界完成，其余代码只面对强类型的 [`ChannelArgs`]。
//!
//! ## 行为契约（What）
//! - 缺省映射编组为空列表；
//! - 按映射迭代顺序逐条处理：取值必须是 32 位整数或文本，否则立即返回
//!   [`ChannelError::InvalidArgumentValue`]，已编组的条目随错误一起丢弃；
//! - 输出顺序与输入一致，不去重、不排序。
//!
//! ## 生命周期（Trade-offs）
//! - [`ChannelArgs`] 仅存活于一次构造调用内，原生层自行复制所需内容；
//!   通道对象不会保留参数列表。

use crate::{
    error::{ChannelError, Result},
    value::{ConfigMap, HostValue},
};

/// 参数值的类型标签。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArgType {
    Integer,
    Text,
}

/// 强类型参数值，仅支持两种变体。
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ArgValue {
    Integer(i32),
    Text(String),
}

impl ArgValue {
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::Integer(_) => ArgType::Integer,
            ArgValue::Text(_) => ArgType::Text,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            ArgValue::Integer(value) => Some(*value),
            ArgValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(value) => Some(value),
            ArgValue::Integer(_) => None,
        }
    }
}

/// 单个参数条目。
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChannelArg {
    key: String,
    value: ArgValue,
}

impl ChannelArg {
    pub fn new(key: impl Into<String>, value: ArgValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &ArgValue {
        &self.value
    }
}

/// 编组后的有序参数列表。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChannelArgs {
    args: Vec<ChannelArg>,
}

impl ChannelArgs {
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChannelArg> {
        self.args.iter()
    }

    /// 查找键对应的取值；重复键时以最后一次出现为准。
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.args
            .iter()
            .rev()
            .find(|arg| arg.key == key)
            .map(ChannelArg::value)
    }

    pub fn get_integer(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(ArgValue::as_integer)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ArgValue::as_text)
    }
}

impl<'a> IntoIterator for &'a ChannelArgs {
    type Item = &'a ChannelArg;
    type IntoIter = std::slice::Iter<'a, ChannelArg>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

impl FromIterator<ChannelArg> for ChannelArgs {
    fn from_iter<I: IntoIterator<Item = ChannelArg>>(iter: I) -> Self {
        Self {
            args: iter.into_iter().collect(),
        }
    }
}

/// 将配置映射编组为参数列表。
///
/// # 教案式注释
/// - **契约 (What)**：
///   - `map`：可缺省的配置映射，缺省时返回空列表；
///   - 返回值长度、顺序与输入一致，取值逐一保真；
///   - 第一个非法条目触发 [`ChannelError::InvalidArgumentValue`]，携带其键与实际种类。
/// - **执行 (How)**：逐条转换并以 `collect::<Result<_, _>>` 短路，失败时中间结果随之释放。
///
/// ```
/// use spark_rpc_channel::{args::marshal, value::ConfigMap};
///
/// let map = ConfigMap::new()
///     .with("grpc.max_receive_message_length", 4_194_304)
///     .with("grpc.primary_user_agent", "probe/1.0");
/// let args = marshal(Some(&map)).expect("整数与文本均可编组");
/// assert_eq!(args.len(), 2);
/// assert_eq!(args.get_integer("grpc.max_receive_message_length"), Some(4_194_304));
/// ```
pub fn marshal(map: Option<&ConfigMap>) -> Result<ChannelArgs> {
    let Some(map) = map else {
        return Ok(ChannelArgs::default());
    };
    map.iter()
        .map(|(key, value)| marshal_entry(key, value))
        .collect()
}

fn marshal_entry(key: &str, value: &HostValue) -> Result<ChannelArg> {
    let value = if let Some(integer) = value.as_int32() {
        ArgValue::Integer(integer)
    } else if let Some(text) = value.as_text() {
        ArgValue::Text(text.to_owned())
    } else {
        return Err(ChannelError::InvalidArgumentValue {
            key: key.to_owned(),
            kind: value.kind(),
        });
    };
    Ok(ChannelArg::new(key, value))
}
