//! 通用枚举模块。
//!
//! 所有在此模块中定义的枚举都派生 `Serialize`, `Deserialize`, `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`，
//! 以支持数据交换、调试和集合操作。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 中继服务接受的 `action` 字段取值。
///
/// 线上格式为全大写字符串。除 `Test` 外，服务端对这些动作不做区分，
/// 只是用它们来判断一帧是否属于已知词汇表。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayAction {
    /// 一端按下了空格键，需要同步给同组的另一端。
    #[serde(rename = "SPACEPUSHED")]
    SpacePushed,
    /// 客户端请求服务端在固定延迟后向自己回送一条 `SPACEPUSHED`，用于探测往返链路。
    #[serde(rename = "TEST")]
    Test,
    /// 客户端声明加入某个配对码。服务端按普通帧转发，没有额外处理。
    #[serde(rename = "REGISTER")]
    Register,
}

impl RelayAction {
    /// 全部合法动作，顺序与线上文档一致。
    pub const ALL: [RelayAction; 3] = [RelayAction::SpacePushed, RelayAction::Test, RelayAction::Register];

    /// 返回动作在线上使用的字符串。
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayAction::SpacePushed => "SPACEPUSHED",
            RelayAction::Test => "TEST",
            RelayAction::Register => "REGISTER",
        }
    }

    /// 按线上字符串查找动作，大小写敏感；未知值返回 `None`。
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == value)
    }
}

impl fmt::Display for RelayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
