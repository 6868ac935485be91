/// User-facing strings for TubeSession.
/// Locale can be selected via the `--locale` CLI flag (e.g. `--locale zh`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" | "zh-hans" | "zh-tw" | "zh_tw" => Self::Zh,
            _ => Self::En,
        }
    }
}

pub struct Messages {
    pub invalid_url: &'static str,
    pub busy: &'static str,
    pub completed: &'static str,
    pub cancelled: &'static str,
    pub failed_prefix: &'static str,
    pub unavailable: &'static str,
    pub no_format: &'static str,
    pub auth_required: &'static str,
    pub network: &'static str,
    pub resolving: &'static str,
    pub paused: &'static str,
    pub cancelling: &'static str,
    pub items_label: &'static str,
    pub controls_hint: &'static str,
}

pub static EN: Messages = Messages {
    invalid_url: "Please enter a valid YouTube URL",
    busy: "A download is already in progress",
    completed: "Download complete",
    cancelled: "Download cancelled",
    failed_prefix: "Failed to download",
    unavailable: "This video is unavailable.",
    no_format: "No format matches the selected quality.",
    auth_required: "This video requires sign-in.",
    network: "Network error while contacting the site.",
    resolving: "fetching metadata",
    paused: "paused",
    cancelling: "cancelling",
    items_label: "item",
    controls_hint: "[p]ause [r]esume [c]ancel, then Enter",
};

pub static ZH: Messages = Messages {
    invalid_url: "请输入有效的 YouTube 链接",
    busy: "已有下载正在进行",
    completed: "下载完成",
    cancelled: "下载已取消",
    failed_prefix: "下载失败",
    unavailable: "该视频不可用。",
    no_format: "没有符合所选画质的格式。",
    auth_required: "该视频需要登录。",
    network: "连接站点时出现网络错误。",
    resolving: "正在获取元数据",
    paused: "已暂停",
    cancelling: "正在取消",
    items_label: "条目",
    controls_hint: "输入 p 暂停、r 继续、c 取消，然后按回车",
};

pub fn get_messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Zh => &ZH,
    }
}
