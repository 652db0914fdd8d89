//! End-to-end resolution through the facade with real adapters pointed at
//! local mock servers and a stub short-link expander.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use vidparse::platform::douyin::DouyinAdapter;
use vidparse::platform::weibo::WeiboAdapter;
use vidparse::{
    CallContext, ErrorKind, LinkExpander, MediaClient, MediaError, Platform, Registry, Resolver,
    Stage,
};

const SHARE_TEXT: &str =
    "08/12 我在抖音，看到一个很有趣的视频，快来看吧！ https://v.douyin.com/abcd1234/ 复制此链接";
const DOUYIN_ID: &str = "7301234567890123456";

/// Expander that records what it was asked and answers with a fixed URL.
struct StubExpander {
    target: String,
    seen: Mutex<Vec<String>>,
}

impl StubExpander {
    fn new(target: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            target: target.into(),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LinkExpander for StubExpander {
    async fn expand(&self, url: &str, ctx: &CallContext) -> vidparse::error::Result<String> {
        self.seen.lock().unwrap().push(url.to_string());
        ctx.run(async { Ok(self.target.clone()) }).await
    }
}

/// Expander that never answers in time.
struct StalledExpander;

#[async_trait]
impl LinkExpander for StalledExpander {
    async fn expand(&self, _url: &str, ctx: &CallContext) -> vidparse::error::Result<String> {
        ctx.run(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        })
        .await
    }
}

fn douyin_share_page() -> String {
    let state = json!({
        "loaderData": {
            "video_(id)/page": {
                "videoInfoRes": {
                    "item_list": [{
                        "desc": "很有趣的视频",
                        "video": {
                            "play_addr": { "url_list": ["https://aweme.snssdk.com/aweme/v1/playwm/?video_id=v0200fg10000"] },
                            "cover": { "url_list": ["https://p3-sign.douyinpic.com/cover.jpeg"] }
                        },
                        "music": { "play_url": { "uri": "https://sf5-hl-cdn.douyinstatic.com/obj/bgm.mp3" } },
                        "author": {
                            "uid": "98765",
                            "sec_uid": "MS4wLjABAAAAexample",
                            "nickname": "分享者",
                            "avatar_thumb": { "url_list": ["https://p3.douyinpic.com/aweme/100x100/avatar.jpeg"] }
                        }
                    }]
                }
            }
        }
    });
    format!(
        "<!DOCTYPE html><html><head><script async src=\"/sdk.js\"></script></head>\
         <body><div id=\"root\"></div><script>window._ROUTER_DATA = {state}</script></body></html>"
    )
}

#[tokio::test]
async fn douyin_share_text_resolves_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    let page = server
        .mock("GET", format!("/share/video/{DOUYIN_ID}/").as_str())
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body(douyin_share_page())
        .create_async()
        .await;

    let expander = StubExpander::new(format!(
        "https://www.iesdouyin.com/share/video/{DOUYIN_ID}/?region=CN&mid=7301"
    ));
    let registry = Registry::builtin().with(DouyinAdapter::with_base(server.url()));
    let resolver = Resolver::with_parts(
        registry,
        Arc::new(MediaClient::new().unwrap()),
        expander.clone(),
    );

    let res = resolver
        .resolve_share_text(SHARE_TEXT, &CallContext::new())
        .await
        .unwrap();

    page.assert_async().await;
    assert_eq!(
        expander.seen.lock().unwrap().as_slice(),
        ["https://v.douyin.com/abcd1234/"]
    );
    assert_eq!(res.platform, Platform::Douyin);
    assert_eq!(res.native_id, DOUYIN_ID);

    let media = res.media;
    assert!(media.video_url.as_deref().is_some_and(|u| !u.is_empty()));
    assert!(!media.video_url.as_deref().unwrap().contains("playwm"));
    assert!(media.author.uid.as_deref().is_some_and(|u| !u.is_empty()));
    assert_eq!(media.title, "很有趣的视频");
    assert_eq!(
        media.music_url.as_deref(),
        Some("https://sf5-hl-cdn.douyinstatic.com/obj/bgm.mp3")
    );
}

#[tokio::test]
async fn canonical_weibo_link_skips_expansion() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/component")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "code": "100000",
                "data": { "Component_Play_Playinfo": {
                    "title": "微博视频",
                    "urls": { "高清 720P": "//f.video.weibocdn.com/o0/720.mp4" },
                    "author": "博主",
                    "author_id": 1234567
                }}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let expander = StubExpander::new("unused");
    let registry = Registry::builtin().with(WeiboAdapter::with_api_base(server.url()));
    let resolver = Resolver::with_parts(
        registry,
        Arc::new(MediaClient::new().unwrap()),
        expander.clone(),
    );

    let res = resolver
        .resolve_share_text(
            "https://video.weibo.com/show?fid=1034:4914351942074379",
            &CallContext::new(),
        )
        .await
        .unwrap();

    assert!(expander.seen.lock().unwrap().is_empty());
    assert_eq!(res.native_id, "1034:4914351942074379");
    assert_eq!(
        res.media.video_url.as_deref(),
        Some("https://f.video.weibocdn.com/o0/720.mp4")
    );
    assert_eq!(res.media.author.uid.as_deref(), Some("1234567"));
}

#[tokio::test]
async fn upstream_failure_is_tagged_with_fetch_stage() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", format!("/share/video/{DOUYIN_ID}/").as_str())
        .with_status(503)
        .create_async()
        .await;

    let registry = Registry::builtin().with(DouyinAdapter::with_base(server.url()));
    let resolver = Resolver::with_parts(
        registry,
        Arc::new(MediaClient::new().unwrap()),
        StubExpander::new("unused"),
    );

    let err = resolver
        .resolve_by_id("douyin", DOUYIN_ID, &CallContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Fetch);
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(!err.kind().is_retryable());
}

#[tokio::test]
async fn deadline_aborts_stalled_expansion() {
    let resolver = Resolver::with_parts(
        Registry::builtin(),
        Arc::new(MediaClient::new().unwrap()),
        Arc::new(StalledExpander),
    );
    let ctx = CallContext::with_timeout(Duration::from_millis(50));

    let started = std::time::Instant::now();
    let err = resolver.resolve_share_text(SHARE_TEXT, &ctx).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(err.stage, Stage::Redirect);
    assert_eq!(err.error, MediaError::Timeout);
}

#[tokio::test]
async fn every_platform_signature_reaches_its_adapter() {
    let fixtures = [
        ("https://www.douyin.com/video/7301", Platform::Douyin),
        ("https://www.kuaishou.com/short-video/3xabc", Platform::Kuaishou),
        ("https://h5.pipix.com/item/7012", Platform::Pipixia),
        ("https://m.weibo.cn/tv/show/1034:49", Platform::Weibo),
        ("https://www.xiaohongshu.com/explore/64b8f1a2000000001e03c7d5", Platform::Redbook),
        ("https://www.bilibili.com/video/BV1xx411c7mD", Platform::Bilibili),
    ];

    let registry = Registry::builtin();
    for (url, platform) in fixtures {
        let matched = vidparse::match_share_text(url).unwrap();
        assert_eq!(matched.platform, platform, "{url}");
        let adapter = registry.get(platform).unwrap();
        assert!(adapter.extract_id(&matched.url).is_ok(), "{url}");
    }
}
