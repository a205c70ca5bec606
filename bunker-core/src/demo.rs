//! Sample manuscript for first runs.

use crate::ordering::{self, OrderingError};
use crate::schema::{ChapterId, NewCharacter, ScenePatch, NOVEL_TITLE_KEY, SYNOPSIS_KEY};
use crate::store::Store;

const NOVEL_TITLE: &str = "글을 쓰는 사람들";

const SYNOPSIS: &str = "《글을 쓰는 사람들》\n\n\
소설가를 꿈꾸는 카페 아르바이트생 이서윤이 우연한 기회로 출판계에 발을 들이며 겪는 성장과 도전의 이야기.\n\n\
믿음과 좌절, 열정과 현실 사이에서 균형을 찾아가는 젊은 작가의 여정을 그리며, 창작의 고통과 기쁨, \
그리고 사람들과의 연결을 통해 진정한 작가로 성장해가는 과정을 담았다.";

const CHARACTERS: [(&str, &str, &[&str]); 3] = [
    (
        "이서윤",
        "28세, 소설가 지망생. 카페에서 아르바이트를 하며 첫 장편소설을 집필 중이다.",
        &["주인공", "여성", "작가"],
    ),
    (
        "강민호",
        "32세, 출판사 편집자. 서윤의 원고를 우연히 발견하고 관심을 갖게 된다.",
        &["조연", "남성", "편집자"],
    ),
    (
        "박지우",
        "55세, 베스트셀러 작가. 서윤의 멘토가 되어준다.",
        &["조연", "여성", "작가", "멘토"],
    ),
];

struct DemoScene {
    title: &'static str,
    content: &'static str,
    characters: &'static [&'static str],
}

const PROLOGUE: [DemoScene; 2] = [
    DemoScene {
        title: "카페의 아침",
        content: "",
        characters: &[],
    },
    DemoScene {
        title: "우연한 발견",
        content: "<p>서윤은 카페 구석 자리에 앉아 노트북을 펼쳤다. 아침 손님들의 웅성거림 속에서도 \
                  그녀의 손가락은 키보드 위를 쉴 새 없이 움직였다.</p>\
                  <p>\"또 소설 쓰세요?\"</p>\
                  <p>단골 손님 중 한 명이 지나가며 물었다. 서윤은 미소를 지으며 고개를 끄덕였다.</p>",
        characters: &["이서윤"],
    },
];

const FIRST_MEETING: [DemoScene; 3] = [
    DemoScene {
        title: "출판사에서",
        content: "",
        characters: &[],
    },
    DemoScene {
        title: "편집자의 제안",
        content: "<p>\"이 원고, 어디서 구하셨어요?\"</p>\
                  <p>민호는 책상 위에 놓인 원고 뭉치를 손가락으로 두드렸다.</p>\
                  <p>\"이건... 출판할 가치가 있어요.\"</p>",
        characters: &["강민호"],
    },
    DemoScene {
        title: "멘토의 조언",
        content: "<p>\"글을 쓴다는 건 말이야,\" 박지우 작가가 커피잔을 내려놓으며 말했다. \
                  \"자신의 영혼을 한 글자 한 글자에 담는 일이란다.\"</p>\
                  <p>서윤은 숨을 죽이고 귀를 기울였다.</p>",
        characters: &["박지우", "이서윤"],
    },
];

/// Seed the sample manuscript if the store has no chapters.
///
/// Returns `true` when data was written.
pub async fn seed_if_empty(store: &dyn Store) -> Result<bool, OrderingError> {
    if !store.list_chapters().await?.is_empty() {
        return Ok(false);
    }

    for (name, description, tags) in CHARACTERS {
        store
            .create_character(NewCharacter {
                name: name.to_string(),
                description: description.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            })
            .await?;
    }

    let prologue = ordering::append_chapter(store, "프롤로그").await?;
    let first_meeting = ordering::append_chapter(store, "첫 번째 만남").await?;
    seed_scenes(store, prologue, &PROLOGUE).await?;
    seed_scenes(store, first_meeting, &FIRST_MEETING).await?;

    store.put_setting(NOVEL_TITLE_KEY, NOVEL_TITLE).await?;
    store.put_setting(SYNOPSIS_KEY, SYNOPSIS).await?;

    tracing::info!("Seeded demo manuscript");
    Ok(true)
}

async fn seed_scenes(
    store: &dyn Store,
    chapter: ChapterId,
    scenes: &[DemoScene],
) -> Result<(), OrderingError> {
    for (position, scene) in (0i64..).zip(scenes) {
        let id = ordering::create_scene(store, chapter, scene.title, Some(position)).await?;

        if !scene.content.is_empty() {
            let names = scene.characters.iter().map(|n| n.to_string()).collect();
            store
                .update_scene(
                    id,
                    ScenePatch::content(scene.content).with_characters(names),
                )
                .await?;
        }
    }
    Ok(())
}
