//! # host：动态类型宿主调用面
//!
//! ## 核心意图（Why）
//! - 宿主以松散类型调用通道：目标、凭据、参数表、观测参数都可能是任意种类的值；
//! - 本模块负责把 [`HostValue`] 校验并翻译为强类型 API 的输入，所有种类错误在触碰原生层之前同步返回。
//!
//! ## 契约说明（What）
//! - 构造：目标须为文本，凭据须为凭据对象或 `undefined`，参数表须为 `undefined` 或对象；
//! - 观测：上次状态须为合法状态码（非负整值），截止时间为数字（Unix 毫秒，允许 ±∞）或日期，
//!   回调须为函数；
//! - 状态读取：仅字面量 `true` 会发起连接尝试，返回宿主可见的数值状态码。

use crate::{
    channel::{Channel, ChannelBuilder},
    connectivity::ConnectivityState,
    deadline::Deadline,
    error::{ChannelError, Result},
    value::HostValue,
};

/// 以宿主参数构造通道。
pub fn construct(target: &HostValue, credentials: &HostValue, args: &HostValue) -> Result<Channel> {
    construct_with(target, credentials, args, |builder| builder)
}

/// 以宿主参数构造通道，并允许在构造前调整构造器（注入工厂、队列或选项）。
pub fn construct_with(
    target: &HostValue,
    credentials: &HostValue,
    args: &HostValue,
    configure: impl FnOnce(ChannelBuilder) -> ChannelBuilder,
) -> Result<Channel> {
    let Some(target) = target.as_text() else {
        return Err(ChannelError::invalid_type(format!(
            "Channel expects a string target, got {}",
            target.kind()
        )));
    };
    let mut builder = ChannelBuilder::new(target);

    match credentials {
        HostValue::Undefined => {}
        HostValue::Credentials(credentials) => {
            builder = builder.credentials(credentials.clone());
        }
        other => {
            return Err(ChannelError::InvalidCredentialsType {
                detail: format!(
                    "Channel's second argument must be a ChannelCredentials, got {}",
                    other.kind()
                ),
            });
        }
    }

    match args {
        HostValue::Undefined => {}
        HostValue::Object(map) => builder = builder.args(map.clone()),
        other => {
            return Err(ChannelError::invalid_type(format!(
                "Channel options must be an object with string keys and integer or string values, got {}",
                other.kind()
            )));
        }
    }

    configure(builder).build()
}

/// 以宿主参数注册连通性观测。
pub fn watch_connectivity_state(
    channel: &Channel,
    last_state: &HostValue,
    deadline: &HostValue,
    callback: &HostValue,
) -> Result<()> {
    let last_observed = parse_state(last_state)?;
    let deadline = parse_deadline(deadline)?;
    let HostValue::Function(callback) = callback else {
        return Err(ChannelError::invalid_type(format!(
            "watchConnectivityState's third argument must be a callback, got {}",
            callback.kind()
        )));
    };
    let callback = callback.clone();
    channel.watch_connectivity_state(last_observed, deadline, move |result| {
        callback.call(result)
    })
}

/// 以宿主参数读取连通性状态，返回数值状态码。
pub fn get_connectivity_state(channel: &Channel, try_to_connect: &HostValue) -> Result<u32> {
    let try_to_connect = matches!(try_to_connect, HostValue::Bool(true));
    channel
        .connectivity_state(try_to_connect)
        .map(ConnectivityState::code)
}

fn parse_state(value: &HostValue) -> Result<ConnectivityState> {
    let invalid = || {
        ChannelError::invalid_type(format!(
            "watchConnectivityState's first argument must be a channel state, got {}",
            value.kind()
        ))
    };
    let HostValue::Number(n) = *value else {
        return Err(invalid());
    };
    let code = number_as_uint32(n).ok_or_else(invalid)?;
    ConnectivityState::try_from(code).map_err(|_| invalid())
}

fn parse_deadline(value: &HostValue) -> Result<Deadline> {
    match *value {
        HostValue::Number(millis) => Deadline::from_unix_millis(millis),
        HostValue::Date(at) => Ok(Deadline::from_system_time(at)),
        _ => Err(ChannelError::invalid_type(format!(
            "watchConnectivityState's second argument must be a date or a number, got {}",
            value.kind()
        ))),
    }
}

fn number_as_uint32(n: f64) -> Option<u32> {
    let integral = n.is_finite() && n.fract() == 0.0;
    let in_range = n >= 0.0 && n <= f64::from(u32::MAX);
    let negative_zero = n == 0.0 && n.is_sign_negative();
    (integral && in_range && !negative_zero).then_some(n as u32)
}
