//! A small bundled story exercising most kinds of action.

use libretto_core::{ImageConfig, Position, SceneConfig, Story, actions};
use libretto_error::LibrettoResult;
use libretto_narrative::GameConfig;
use tracing::{debug, instrument};

/// Build and construct the demo story "manor".
///
/// Three scenes: the foyer offers a menu (one choice guarded by a variable),
/// the library joins concurrent blocks and branches on a condition, and the
/// garden runs background blocks beside the main flow.
///
/// # Errors
///
/// Returns an error if the story fails to construct, e.g. when
/// `max_scene_depth` is too small to reach every scene.
#[instrument(skip(config), fields(max_depth = config.max_scene_depth()))]
pub fn demo_story(config: &GameConfig) -> LibrettoResult<Story> {
    let mut story = Story::new("manor").with_max_depth(*config.max_scene_depth());
    let narrator = story.character("Narrator");
    let ada = story.character("Ada");
    let lamp = story.image(
        "lamp",
        ImageConfig::new("lamp.png").with_position(Position::new(0.2, 0.6)),
    );
    let shelf = story.image("shelf", ImageConfig::new("shelf.png"));
    let rain = story.sound("rain", "rain.ogg");
    let chime = story.sound("chime", "chime.ogg");

    let foyer = story.scene(
        "foyer",
        SceneConfig::default()
            .with_background("foyer.png")
            .with_music("theme.ogg"),
    )?;
    let library = story.scene("library", SceneConfig::default().with_background("library.png"))?;
    let garden = story.scene("garden", SceneConfig::default().with_background("garden.png"))?;
    story.mount(&library, &shelf)?;

    story.script(&foyer, |b| {
        actions![
            b.script(|ctx| ctx.set("candles", 0)),
            b.sound(&rain).play(),
            b.character(&narrator).say("Rain drums on the manor windows."),
            b.image(&lamp).show(),
            b.character(&ada).say("Where should we look first?"),
            b.menu()
                .prompt("Choose a room")
                .choose("The library", |b| actions![b.scene(&library).jump()])
                .choose("The garden", |b| actions![b.scene(&garden).jump()])
                .choose_if(
                    "Light the candles",
                    |ctx| ctx.get::<i32>("candles") == Some(0),
                    |b| {
                        actions![
                            b.repeat(3, |b| {
                                actions![b.script(|ctx| {
                                    let lit = ctx.get::<i32>("candles").unwrap_or(0);
                                    ctx.set("candles", lit + 1);
                                })]
                            }),
                            b.character(&ada).say("Three candles. Much better."),
                            b.scene(&library).jump(),
                        ]
                    },
                ),
        ]
    })?;

    story.script(&library, |b| {
        actions![
            b.image(&shelf).show(),
            b.all(|b| vec![
                actions![b.image(&lamp).set_position(Position::new(0.7, 0.6)), b.sleep(300)],
                actions![b.sound(&chime).play_and_wait()],
            ]),
            b.condition()
                .if_(
                    |ctx| ctx.get::<i32>("candles").unwrap_or(0) >= 3,
                    |b| actions![b.character(&ada).say("The candlelight shows a hidden door.")],
                )
                .else_(|b| actions![b.character(&ada).say("Too dark to read anything.")]),
            b.character(&narrator).say("And so the night ends."),
        ]
    })?;

    story.script(&garden, |b| {
        actions![
            b.sound(&rain).stop(),
            b.image(&lamp).hide(),
            b.scene(&garden).set_music("birds.ogg"),
            b.sound(&chime).set_volume(0.5),
            b.do_async(|b| actions![b.sleep(500), b.sound(&chime).play()]),
            b.any(|b| vec![
                actions![b.sleep(1000)],
                actions![b.character(&ada).say("Listen, the bells!")],
            ]),
            b.character(&ada).say("Let's head back inside."),
            b.scene(&library).jump(),
        ]
    })?;

    story.entry(&foyer)?;
    story.construct()?;
    debug!(actions = story.action_count(), "Demo story constructed");
    Ok(story)
}
